//! Interactive fallback for missing command-line arguments.

use std::io::{self, BufRead, Write};

/// Description of one positional argument and the value used when the
/// user gives none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSpec<'a> {
    pub description: &'a str,
    pub default: &'a str,
}

impl<'a> ArgumentSpec<'a> {
    pub const fn new(description: &'a str, default: &'a str) -> Self {
        Self {
            description,
            default,
        }
    }
}

/// Ask for every argument in `specs`.
///
/// With `use_defaults` nothing is read and the defaults are returned.
/// Otherwise each description is written to `output` followed by the
/// default in brackets; an empty reply (or end of input) accepts it.
pub fn prompt_arguments(
    program: &str,
    specs: &[ArgumentSpec<'_>],
    use_defaults: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Vec<String>> {
    if use_defaults {
        return Ok(specs.iter().map(|spec| spec.default.to_string()).collect());
    }

    writeln!(output, "Enter arguments for '{program}':")?;
    writeln!(output, "    (Empty input accepts default values)")?;

    let mut arguments = Vec::with_capacity(specs.len());
    for spec in specs {
        write!(output, "{}\n [{}]:", spec.description, spec.default)?;
        output.flush()?;

        let mut reply = String::new();
        input.read_line(&mut reply)?;
        let reply = reply.trim();
        arguments.push(if reply.is_empty() {
            spec.default.to_string()
        } else {
            reply.to_string()
        });
    }
    Ok(arguments)
}

/// Keep `supplied` when it has exactly one value per spec, otherwise prompt
/// for all of them.
pub fn fill_missing(
    program: &str,
    supplied: Vec<String>,
    specs: &[ArgumentSpec<'_>],
    use_defaults: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<Vec<String>> {
    if supplied.len() == specs.len() {
        return Ok(supplied);
    }
    prompt_arguments(program, specs, use_defaults, input, output)
}
