pub mod chart;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod datetime;
pub mod filter;
pub mod model;
pub mod remote;
pub mod render;
pub mod route;
pub mod session;
pub mod store;
pub mod sync;

use std::ffi::OsString;
use std::io::IsTerminal;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tally"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.tallyrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .iter()
        .map(|kv| {
          (kv.key.clone(), kv.value.clone())
        })
    )
  );
  if let Some(url) = cli.url.as_ref() {
    cfg.apply_overrides([(
      "service.url".to_string(),
      url.clone()
    )]);
  }

  let service =
    remote::HttpDataService::new(
      &cfg.service_url(),
      cfg.service_timeout()?
    )
    .with_context(|| {
      format!(
        "failed to set up data service \
         at {}",
        cfg.service_url()
      )
    })?;

  let batch = cli.batch_lines();
  let mode = if batch.is_empty() {
    session::Mode::Interactive
  } else {
    session::Mode::Batch
  };
  let renderer = render::Renderer::new(
    &cfg,
    std::io::stdout().is_terminal()
  )?;
  let path = cli
    .path
    .clone()
    .unwrap_or_else(|| cfg.default_path());

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  let local = tokio::task::LocalSet::new();

  local.block_on(&runtime, async move {
    let service = Rc::new(service);
    let controller =
      session::load_controller(
        service.as_ref(),
        &path
      )
      .await;

    let mut stdout = std::io::stdout();
    match mode {
      | session::Mode::Interactive => {
        let stdin = tokio::io::BufReader::new(
          tokio::io::stdin()
        );
        session::run(
          service, renderer, controller,
          stdin, &mut stdout, mode
        )
        .await?;
      }
      | session::Mode::Batch => {
        let script = batch.join("\n");
        session::run(
          service,
          renderer,
          controller,
          script.as_bytes(),
          &mut stdout,
          mode
        )
        .await?;
      }
    }
    anyhow::Ok(())
  })?;

  info!("done");
  Ok(())
}
