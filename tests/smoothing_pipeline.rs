use std::fs;

use medbv_view::{
    Config, DiffusionParams, ImageLocator, Orientation, ParameterDictionary, Pipeline, Volume,
    VolumeLoader,
};
use ndarray::Array3;
use tempfile::TempDir;

fn phantom() -> Volume<i16> {
    // bright cube in a dark, slightly noisy background
    let data = Array3::from_shape_fn((8, 10, 10), |(z, y, x)| {
        let inside = (2..6).contains(&z) && (3..7).contains(&y) && (3..7).contains(&x);
        let noise = ((x * 5 + y * 3 + z * 7) % 4) as i16;
        if inside { 1000 + noise } else { noise }
    });
    Volume::new(data, (0.9, 0.9, 1.5)).with_origin((-4.5, -4.5, 0.0))
}

#[test]
fn test_read_smooth_write_read() {
    let root = TempDir::new().unwrap();
    fs::create_dir(root.path().join("phantoms")).unwrap();
    VolumeLoader::write_image(root.path().join("phantoms/cube.mhd"), &phantom(), false).unwrap();

    let config = Config::from_lookup(|_| None).with_data_root(root.path());
    let locator = ImageLocator::from_config(&config);
    let input = VolumeLoader::read_image::<f32>(&locator, "phantoms/cube.mhd", 3, true).unwrap();
    assert_eq!(input.dim(), (8, 10, 10));
    assert_eq!(input.spacing, (0.9, 0.9, 1.5));

    let parameters = ParameterDictionary::parse(
        "# smoothing\nNumberOfIterations 3\nTimeStep 0.02\n",
        '#',
        "inline.par",
    );
    let pipeline = Pipeline::new(DiffusionParams::from_parameters(&parameters).unwrap());
    let segmented = pipeline.segment_image(&input);

    let output = root.path().join("cube_smoothed.mhd");
    VolumeLoader::write_image(&output, &segmented, true).unwrap();
    assert!(root.path().join("cube_smoothed.raw").is_file());

    let reloaded = VolumeLoader::read_path::<f32>(&output, 3).unwrap();
    assert_eq!(reloaded, segmented);
    assert_eq!(reloaded.origin, (-4.5, -4.5, 0.0));

    // the cube stays clearly separated from the background
    assert!(reloaded.data[[4, 5, 5]] > 900.0);
    assert!(reloaded.data[[0, 0, 0]] < 100.0);
}

#[test]
fn test_slice_export() {
    let dir = TempDir::new().unwrap();
    let volume = phantom();

    let image = volume.slice_image(4, Orientation::Axial).unwrap();
    let path = dir.path().join("slice.png");
    image.save(&path).unwrap();

    let decoded = image::open(&path).unwrap().to_luma8();
    assert_eq!(decoded.dimensions(), (10, 10));
    assert!(decoded.get_pixel(5, 5)[0] > 250);
    assert!(decoded.get_pixel(0, 0)[0] < 5);
}
