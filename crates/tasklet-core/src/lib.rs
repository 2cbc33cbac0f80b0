pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod id;
pub mod locale;
pub mod render;
pub mod storage;
pub mod store;
pub mod task;
pub mod timer;
pub mod view;

use std::ffi::OsString;

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
    "starting tasklet"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskletrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  )?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let blobs =
    storage::FileBlobStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open storage at {}",
        data_dir.display()
      )
    })?;

  let store = store::TaskStore::open(
    storage::TaskRepository::new(
      Box::new(blobs)
    )
  );
  let mut controller =
    controller::Controller::with_delete_delay(
      store,
      cfg.delete_delay
    );
  controller.subscribe(
    render::Renderer::new(&cfg)
  );

  let command =
    cli.command.unwrap_or(
      cli::Command::List {
        filter: task::Filter::All
      }
    );
  commands::dispatch(
    &mut controller,
    command
  )?;

  info!("done");
  Ok(())
}
