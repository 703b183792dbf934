use std::{env, fs, path::PathBuf};
use mp4_avc_parse::{read_mp4, ParseOptions};

fn main() {
    env_logger::init();

    let path = PathBuf::from(env::args_os().nth(1).expect("Specify path to an MP4 file"));
    let file = fs::read(&path).unwrap();
    let options = ParseOptions { keep_media_data: false, ..ParseOptions::lenient() };
    let mp4 = read_mp4(&mut file.as_slice(), &options).unwrap();

    println!("{:#?}", mp4.boxes);

    for config in mp4.boxes.avc_configs() {
        println!("profile {} level {}, {}-byte NAL lengths", config.avc_profile_indication, config.avc_level_indication, config.length_size());
        for set in config.parameter_sets() {
            println!("  {} ({} bytes)", set.nal_unit.nal_unit_type, set.length);
        }
    }

    for diagnostic in mp4.diagnostics.iter() {
        println!("{:?} at {}: {}", diagnostic.severity, diagnostic.offset, diagnostic.message);
    }
}
