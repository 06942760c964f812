//! Base64 command line tool.
//!
//! ```text
//! cargo run -p tcpmux --example base64 -- --encode "Man"
//! cargo run -p tcpmux --example base64 -- --decode "TWFu"
//! cargo run -p tcpmux --example base64
//! ```
//!
//! Without arguments it round-trips a few samples covering every padding
//! case and reports any mismatch.

use std::process::ExitCode;

use tcpmux::codec::base64;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [flag, text] if flag == "--encode" => {
            println!("{}", base64::encode(text.as_bytes()));
            ExitCode::SUCCESS
        }
        [flag, text] if flag == "--decode" => match base64::decode(text) {
            Ok(bytes) => {
                println!("{}", String::from_utf8_lossy(&bytes));
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        [] => round_trip(),
        _ => {
            eprintln!("usage: base64 [--encode TEXT | --decode TEXT]");
            ExitCode::FAILURE
        }
    }
}

fn round_trip() -> ExitCode {
    let samples: [&[u8]; 5] = [b"", b"M", b"Ma", b"Man", b"any carnal pleasure."];
    let mut failed = false;

    for sample in samples {
        let encoded = base64::encode(sample);
        let ok = base64::decode(&encoded).is_ok_and(|decoded| decoded == sample);

        println!(
            "{:<24} {:<32} {}",
            format!("{:?}", String::from_utf8_lossy(sample)),
            encoded,
            if ok { "ok" } else { "MISMATCH" }
        );
        failed |= !ok;
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
