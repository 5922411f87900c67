//! The trackfs binary: parse, dispatch, exit.

fn main() {
    std::process::exit(cli::run(std::env::args_os()));
}
