use std::{env, fs, path::PathBuf};
use mp4_avc_parse::{read_annexb, ParseOptions};

fn main() {
    env_logger::init();

    let path = PathBuf::from(env::args_os().nth(1).expect("Specify path to an H.264 Annex B stream"));
    let file = fs::read(&path).unwrap();
    let stream = read_annexb(&mut file.as_slice(), &ParseOptions::lenient()).unwrap();

    for unit in stream.nal_units.iter() {
        println!("{} ref_idc {}, {} bytes", unit.nal_unit_type, unit.nal_ref_idc, unit.payload.len() + 1);
    }
    println!("{} NAL units", stream.nal_units.len());

    for diagnostic in stream.diagnostics.iter() {
        println!("{:?} at {}: {}", diagnostic.severity, diagnostic.offset, diagnostic.message);
    }
}
