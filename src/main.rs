fn main() {
    if let Err(err) = intervault::run() {
        eprintln!("intervault: {err:#}");
        std::process::exit(1);
    }
}
