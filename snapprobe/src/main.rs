fn main() {
    if let Err(e) = snapprobe::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(snapprobe::exit_code(&e));
    }
}
