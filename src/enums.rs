use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "axial" => Ok(Self::Axial),
            "coronal" => Ok(Self::Coronal),
            "sagittal" => Ok(Self::Sagittal),
            other => Err(format!("unknown orientation '{other}'")),
        }
    }
}

/// Voxel element types of the MetaImage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Char => "MET_CHAR",
            Self::UChar => "MET_UCHAR",
            Self::Short => "MET_SHORT",
            Self::UShort => "MET_USHORT",
            Self::Int => "MET_INT",
            Self::UInt => "MET_UINT",
            Self::Float => "MET_FLOAT",
            Self::Double => "MET_DOUBLE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        // MET_LONG is 32 bit in the MetaIO reference implementation
        match tag {
            "MET_CHAR" => Some(Self::Char),
            "MET_UCHAR" => Some(Self::UChar),
            "MET_SHORT" => Some(Self::Short),
            "MET_USHORT" => Some(Self::UShort),
            "MET_INT" | "MET_LONG" => Some(Self::Int),
            "MET_UINT" | "MET_ULONG" => Some(Self::UInt),
            "MET_FLOAT" => Some(Self::Float),
            "MET_DOUBLE" => Some(Self::Double),
            _ => None,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Phases of one viewer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Preparing,
    Launched,
    Waiting,
    CleanedUp,
}
