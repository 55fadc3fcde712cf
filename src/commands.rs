//! Subcommands of the `entry-sync` binary.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};

use entry_sync::queue::ProjectedEntry;
use entry_sync::{
  Entry, EntryData, EntryId, MutationPayload, OfflineController, PendingMutation, SyncOutcome,
};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Queue a new entry
  #[command(visible_alias = "a")]
  Add {
    item: String,
    price: f64,
    /// Date as YYYY-MM-DD (defaults to today)
    #[arg(short, long)]
    date: Option<String>,
    #[arg(short, long)]
    note: Option<String>,
  },
  /// Queue new values for an existing entry
  #[command(visible_alias = "e")]
  Edit {
    id: EntryId,
    item: String,
    price: f64,
    #[arg(short, long)]
    date: Option<String>,
    #[arg(short, long)]
    note: Option<String>,
  },
  /// Queue removal of an entry
  #[command(visible_aliases = ["d", "rm"])]
  Delete { id: EntryId },
  /// Show cached entries
  #[command(visible_alias = "ls")]
  List {
    /// Include writes that have not reached the server yet
    #[arg(short, long)]
    pending: bool,
  },
  /// Show the pending-mutation queue
  #[command(visible_alias = "p")]
  Pending,
  /// Replay the queue and refresh the cache now
  #[command(visible_alias = "s")]
  Sync,
  /// Drop every pending mutation without sending it
  ClearQueue,
}

fn today() -> String {
  chrono::Local::now()
    .date_naive()
    .format(entry_sync::models::DATE_FORMAT)
    .to_string()
}

fn entry_data(item: String, price: f64, date: Option<String>, note: Option<String>) -> EntryData {
  EntryData {
    item,
    price,
    date: date.unwrap_or_else(today),
    note,
  }
}

pub async fn run(command: Command, controller: &OfflineController) -> Result<()> {
  match command {
    Command::Add {
      item,
      price,
      date,
      note,
    } => {
      let mutation = controller
        .queue_add(entry_data(item, price, date, note))
        .await?;
      println!("Queued {}", describe(&mutation));
      settle(controller).await;
    }
    Command::Edit {
      id,
      item,
      price,
      date,
      note,
    } => {
      let mutation = controller
        .queue_edit(id, entry_data(item, price, date, note))
        .await?;
      println!("Queued {}", describe(&mutation));
      settle(controller).await;
    }
    Command::Delete { id } => {
      let mutation = controller.queue_delete(id).await?;
      println!("Queued {}", describe(&mutation));
      settle(controller).await;
    }
    Command::List { pending } => {
      settle(controller).await;
      if pending {
        for entry in controller.projected_entries().await? {
          println!("{}", format_projected(&entry));
        }
      } else {
        for entry in controller.entries().await? {
          println!("{}", format_entry(&entry));
        }
      }
    }
    Command::Pending => {
      let pending = controller.pending().await?;
      if pending.is_empty() {
        println!("Queue is empty");
      }
      for mutation in &pending {
        println!("{}", describe(mutation));
      }
    }
    Command::Sync => {
      if !controller.is_online() {
        return Err(eyre!("Remote is unreachable; writes stay queued until it is back"));
      }
      match settle(controller).await {
        Some(SyncOutcome::Completed(report)) => println!(
          "Synced: {} applied, {} discarded, {} entries cached",
          report.applied, report.discarded, report.cached
        ),
        Some(SyncOutcome::Failed) => return Err(eyre!("Sync failed; see log for details")),
        _ => println!("Sync did not run"),
      }
    }
    Command::ClearQueue => {
      let count = controller.pending().await?.len();
      controller.clear_queue().await?;
      println!("Dropped {} pending mutation(s)", count);
    }
  }

  println!(
    "[{}, sync {}]",
    if controller.is_online() { "online" } else { "offline" },
    controller.sync_status()
  );
  Ok(())
}

/// Run a pass of our own once any background pass is done, so writes made
/// while that pass was in flight are not left behind at exit.
///
/// Returns the outcome of our pass, or `None` when offline.
async fn settle(controller: &OfflineController) -> Option<SyncOutcome> {
  if !controller.is_online() {
    return None;
  }

  let mut status = controller.engine().status_receiver();
  loop {
    match controller.sync_now().await {
      SyncOutcome::AlreadyRunning => {
        if status.wait_for(|s| !s.is_syncing()).await.is_err() {
          return None;
        }
      }
      outcome => return Some(outcome),
    }
  }
}

fn describe(mutation: &PendingMutation) -> String {
  let what = match &mutation.payload {
    MutationPayload::Add(data) => format!("add '{}' ({:.2}, {})", data.item, data.price, data.date),
    MutationPayload::Edit { id, data } => format!(
      "edit #{} -> '{}' ({:.2}, {})",
      id, data.item, data.price, data.date
    ),
    MutationPayload::Delete { id } => format!("delete #{}", id),
  };
  format!("{} [{}]", what, short_id(&mutation.id))
}

fn short_id(id: &str) -> &str {
  id.get(..8).unwrap_or(id)
}

fn format_entry(entry: &Entry) -> String {
  format_row(&entry.id.to_string(), &entry.data(), "")
}

fn format_projected(entry: &ProjectedEntry) -> String {
  let id = entry
    .id
    .map(|id| id.to_string())
    .unwrap_or_else(|| "-".to_string());
  let marker = if entry.is_pending() { " *" } else { "" };
  format_row(&id, &entry.data, marker)
}

fn format_row(id: &str, data: &EntryData, marker: &str) -> String {
  let note = data
    .note
    .as_deref()
    .map(|n| format!("  ({})", n))
    .unwrap_or_default();
  format!(
    "{:>6}  {}  {:>10.2}  {}{}{}",
    id, data.date, data.price, data.item, note, marker
  )
}
