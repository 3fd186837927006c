//! Watch mode: an event loop that keeps the listing current.
//!
//! The loop feeds ticks into the subscriptions (polling, scheduled
//! follow-ups), commits completed fetches, sweeps the shared cache, and
//! maps SIGHUP onto an external revalidation trigger.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::listing::{Server, SyncedDirectory};
use crate::sync::{SyncStore, Trigger};

/// Events driving the watch loop
#[derive(Debug)]
pub enum Event {
  /// Periodic tick for polling and cache sweeping
  Tick,
  /// External request to revalidate now (SIGHUP)
  Refresh,
  /// Shutdown requested (Ctrl-C)
  Quit,
}

/// Event handler that produces ticks and signal events
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    #[cfg(unix)]
    {
      let hup_tx = tx.clone();
      tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut hup) = signal(SignalKind::hangup()) else {
          return;
        };
        while hup.recv().await.is_some() {
          if hup_tx.send(Event::Refresh).is_err() {
            break;
          }
        }
      });
    }

    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = tx.send(Event::Quit);
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// Run `l2dex watch`: render the listing whenever it changes.
pub async fn run(mut dir: SyncedDirectory, store: Arc<SyncStore>) -> Result<()> {
  let mut events = EventHandler::new(Duration::from_secs(1));
  let mut last_sweep = store.now();

  dir.settle().await;
  let mut last_gen = store.generation();
  render(&dir);

  while let Some(event) = events.next().await {
    match event {
      Event::Tick => {
        dir.tick();
        let changed = dir.poll();
        // The generation catches shared-cache writes made outside these
        // subscriptions, not just our own committed fetches
        let gen = store.generation();
        if changed || gen != last_gen {
          last_gen = gen;
          render(&dir);
        }

        let now = store.now();
        if now - last_sweep >= chrono::Duration::minutes(5) {
          last_sweep = now;
          store.purge_expired();
        }
      }
      Event::Refresh => dir.notify(Trigger::Focus),
      Event::Quit => break,
    }
  }

  Ok(())
}

fn render(dir: &SyncedDirectory) {
  if let Some(err) = dir.servers_error() {
    eprintln!("warning: {}", err);
  }
  print_listing(&dir.servers());
}

/// Plain-text listing table, shared with the one-shot `list` command.
pub fn print_listing(servers: &[Server]) {
  if servers.is_empty() {
    println!("no servers listed");
    return;
  }

  println!(
    "{:<28} {:<8} {:<12} {:<12} {:<4} {}",
    "NAME", "RATE", "CHRONICLE", "OPENS", "VIP", "URL"
  );
  for server in servers {
    println!(
      "{:<28} {:<8} {:<12} {:<12} {:<4} {}",
      server.name,
      server.rate,
      server.chronicle,
      server.opening_date.to_string(),
      if server.is_vip { "yes" } else { "-" },
      server.url
    );
  }
}
