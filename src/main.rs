mod cli;

use cli::Cli;

fn main() {
    let cli = Cli::parse_args();
    cli.init_logger();

    if let Err(e) = cli.execute() {
        match e.downcast_ref::<apkverify::VerifyError>() {
            Some(err) => eprintln!(
                "Error: {} (install error code {})",
                err,
                err.install_error_code()
            ),
            None => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}
