pub mod access;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod ordering;
pub mod overdue;
pub mod render;
pub mod store;
pub mod timestamp;
pub mod transition;
pub mod view;

use std::ffi::OsString;
use std::io;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::access::{
  Role,
  StaticRoles,
  require_role
};
use crate::cli::Command;
use crate::store::{
  FollowUpStore,
  JsonlStore
};
use crate::timestamp::TimestampNormalizer;
use crate::transition::{
  Ack,
  StatusTransitioner
};
use crate::view::CalendarView;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting followup CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;

  let roles = if cli.roles.is_empty() {
    StaticRoles::new(
      cfg.access.roles.iter().copied()
    )
  } else {
    StaticRoles::new(cli.roles)
  };
  require_role(&roles, Role::Admin)?;

  let normalizer =
    TimestampNormalizer::new(
      cfg.resolve_timezone()
    );
  let now = cli.now.unwrap_or_else(Utc::now);
  debug!(%now, timezone = %normalizer.timezone(), "resolved clock");

  let command = cli
    .command
    .unwrap_or(Command::Upcoming);

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;
  let store = JsonlStore::open(
    &data_dir,
    normalizer
  )
  .with_context(|| {
    format!(
      "failed to open follow-up \
       store at {}",
      data_dir.display()
    )
  })?;

  let renderer =
    render::Renderer::new(&cfg);
  dispatch(
    &store,
    &renderer,
    normalizer,
    command,
    now
  )?;

  info!("done");
  Ok(())
}

#[tracing::instrument(skip(
  store, renderer, normalizer
))]
pub fn dispatch<S>(
  store: &S,
  renderer: &render::Renderer,
  normalizer: TimestampNormalizer,
  command: Command,
  now: chrono::DateTime<Utc>
) -> anyhow::Result<()>
where
  S: FollowUpStore + ?Sized
{
  let load = || {
    store.fetch_events().context(
      "failed to load follow-ups"
    )
  };
  let out = io::stdout();

  match command {
    | Command::Upcoming => {
      let events = load()?;
      let entries = normalizer
        .collect_scheduled(&events);
      renderer.print_event_table(
        out.lock(),
        &ordering::upcoming(
          &entries, now
        ),
        now
      )
    }
    | Command::Overdue => {
      let events = load()?;
      let entries = normalizer
        .collect_scheduled(&events);
      renderer.print_event_table(
        out.lock(),
        &ordering::overdue(
          &entries, now
        ),
        now
      )
    }
    | Command::Sweep => {
      let mut events = load()?;
      let report =
        StatusTransitioner::new(
          store, normalizer
        )
        .apply_overdue(&mut events, now);
      renderer
        .print_sweep(out.lock(), &report)
    }
    | Command::Complete { id } => {
      let mut events = load()?;
      let ack =
        StatusTransitioner::new(
          store, normalizer
        )
        .mark_completed(
          &mut events,
          &id,
          now
        )
        .with_context(|| {
          format!(
            "failed to complete \
             follow-up {id}"
          )
        })?;
      match ack {
        | Ack::Applied => {
          println!(
            "Completed follow-up {id}."
          )
        }
        | Ack::Unchanged => {
          println!(
            "Follow-up {id} was \
             already completed."
          )
        }
      }
      Ok(())
    }
    | Command::Month { date } => {
      let events = load()?;
      let focus = date.unwrap_or_else(
        || normalizer.to_local(now).date_naive()
      );
      let entries = normalizer
        .collect_scheduled(&events);
      renderer.print_month(
        out.lock(),
        &view::title_for_view(
          CalendarView::Month,
          focus
        ),
        &view::month_grid(
          &entries, focus
        )
      )
    }
    | Command::Week { date } => {
      let events = load()?;
      let focus = date.unwrap_or_else(
        || normalizer.to_local(now).date_naive()
      );
      let entries = normalizer
        .collect_scheduled(&events);
      renderer.print_week(
        out.lock(),
        &view::title_for_view(
          CalendarView::Week,
          focus
        ),
        &view::week_grid(
          &entries, focus
        )
      )
    }
    | Command::Day { date } => {
      let events = load()?;
      let focus = date.unwrap_or_else(
        || normalizer.to_local(now).date_naive()
      );
      let entries = normalizer
        .collect_scheduled(&events);
      renderer.print_day(
        out.lock(),
        &view::title_for_view(
          CalendarView::Day,
          focus
        ),
        &view::day_grid(&entries, focus)
      )
    }
    | Command::Navigate {
      view,
      date,
      direction
    } => {
      println!(
        "{}",
        view::navigate(
          date, view, direction
        )
      );
      Ok(())
    }
  }
}
