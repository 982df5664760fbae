fn main() {
    #[cfg(feature = "cli")]
    oxipuff::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oxipuff: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
