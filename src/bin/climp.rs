//! `climp`: the short-lived client (spec §4.J, §6). Grounded on
//! `original_source/.../client/client.c`'s `client_new`/`client_connect`
//! autospawn-and-retry loop and its straight argv-passthrough contract.

use std::os::fd::AsRawFd;

use color_eyre::Result;
use color_eyre::eyre::Context;

use climp::daemon;
use climp::ipc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cwd = std::env::current_dir()
        .wrap_err("could not determine working directory")?
        .to_string_lossy()
        .into_owned();

    let socket_path = daemon::default_socket_path();
    let climpd_binary = climpd_binary_path()?;

    let mut stream = daemon::autospawn_and_connect(&socket_path, &climpd_binary)
        .await
        .wrap_err("could not connect to climpd")?;

    let fds = [
        std::io::stdin().as_raw_fd(),
        std::io::stdout().as_raw_fd(),
        std::io::stderr().as_raw_fd(),
    ];
    let status = ipc::send_request(&mut stream, fds, cwd, argv)
        .await
        .wrap_err("request to climpd failed")?;

    if status != 0 {
        eprintln!("climp: server sent error (status {status})");
    }
    std::process::exit(status);
}

/// The engine binary lives next to this one (spec §4.J: "spawns the
/// engine binary" — resolved here as climp's own installed sibling).
fn climpd_binary_path() -> Result<std::path::PathBuf> {
    let mut path = std::env::current_exe().wrap_err("could not locate own executable")?;
    path.set_file_name("climpd");
    Ok(path)
}
