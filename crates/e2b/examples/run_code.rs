//! Creates a sandbox, evaluates a code fragment, runs a shell command, and
//! tears the sandbox down. Requires E2B_API_KEY.

use e2b::{CommandOptions, RunCodeOptions, Sandbox, SandboxOptions};

#[tokio::main]
async fn main() -> e2b::Result<()> {
    let sandbox = Sandbox::create(SandboxOptions::new()).await?;
    println!("sandbox {} (envd {})", sandbox.id(), sandbox.envd_version());

    let execution = sandbox
        .run_code(
            "import sys; print('hello from', sys.version.split()[0]); 1 + 1",
            RunCodeOptions::new().on_stdout(|message| print!("{}", message.line)),
        )
        .await?;
    println!("main result: {}", execution.text());

    let result = sandbox
        .commands()
        .run("uname -a", CommandOptions::new())
        .await?;
    print!("{}", result.stdout);

    sandbox.close().await?;
    Ok(())
}
