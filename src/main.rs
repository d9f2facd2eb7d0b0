fn main() {
    env_logger::init();
    if let Err(e) = sigscr::run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
