use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace};

use s3ilm_rs::config::Config;
use s3ilm_rs::{
    CLIArgs, JsonLinesReporter, Suite, create_suite_cancellation_token, exit_code_from_error,
};

mod ctrl_c_handler;
mod tracing_init;

/// s3ilm - S3 Object Lifecycle Management conformance suite.
///
/// This binary is a thin wrapper over the s3ilm-rs library.
/// Results go to stdout as JSON lines, diagnostics to stderr.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3ilm",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    if let Err(e) = run(config).await {
        error!(error = format!("{e:#}"), "s3ilm failed.");
        std::process::exit(exit_code_from_error(&e));
    }
    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Scenario failures are part of the result stream and never fail the
/// process; only setup errors do.
async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_suite_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("suite start.");

    let suite = Suite::new(
        config,
        Arc::new(JsonLinesReporter::stdout()),
        cancellation_token.clone(),
    )
    .await?;
    let summary = suite.run().await?;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    debug!(
        duration_sec = duration_sec,
        passed = summary.passed,
        failed = summary.failed,
        not_applicable = summary.not_applicable,
        "s3ilm has been completed."
    );

    // Lets the ctrl-c handler task finish.
    cancellation_token.cancel();
    Ok(())
}
