fn main() {
    sc_cli::init_tracing();
    std::process::exit(sc_cli::run_cli_from_args(std::env::args_os()));
}
