fn main() {
    if let Err(err) = pchaind::run_entry() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
