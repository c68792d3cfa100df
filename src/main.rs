fn main() {
    if let Err(err) = gazerec_lib::run() {
        log::error!("gazerec failed: {err:?}");
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
