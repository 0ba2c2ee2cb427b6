//! Command-line surface of the `roomlock` binary.
//!
//! ```sh
//! roomlock add-room --name "Sea view"
//! roomlock reserve <ROOM> <REQUESTER> 2024-07-01 2024-07-05
//! roomlock is-reserved <ROOM> <REQUESTER> 2024-07-03
//! roomlock count <REQUESTER> <REQUESTER>...
//! roomlock schedule <ROOM> --from 2024-07-01 --until 2024-08-01
//! roomlock shell            # same commands, one per line on stdin
//! ```

use std::collections::HashSet;
use std::fmt::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ulid::Ulid;

use crate::engine::{EngineError, MakeReservation, ReservationQuery, ReservationService};
use crate::locks::RoomLocks;
use crate::model::{DateRange, Day};
use crate::store::ReservationStore;

#[derive(Parser, Debug)]
#[command(name = "roomlock", version, about = "Date-ranged room reservations without double booking")]
pub struct Cli {
    /// Directory holding the reservation log. Overrides ROOMLOCK_DATA_DIR.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a room; prints its id
    AddRoom {
        /// Use this id instead of generating one
        #[arg(long)]
        id: Option<Ulid>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Reserve ROOM for REQUESTER over [FROM, UNTIL); prints the reservation id
    Reserve {
        room: Ulid,
        requester: Ulid,
        from: Day,
        until: Day,
    },
    /// Does REQUESTER hold ROOM on DAY?
    IsReserved {
        room: Ulid,
        requester: Ulid,
        day: Day,
    },
    /// Reservations held by any of the given requesters
    Count {
        #[arg(required = true)]
        requesters: Vec<Ulid>,
    },
    /// List a room's reservations, optionally only those inside a window
    Schedule {
        room: Ulid,
        #[arg(long, requires = "until")]
        from: Option<Day>,
        #[arg(long, requires = "from")]
        until: Option<Day>,
    },
    /// Read commands from stdin, one per line, until EOF or `quit`
    Shell,
}

/// One line typed into the shell.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

impl ShellLine {
    pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
        Self::try_parse_from(line.split_whitespace()).map(|l| l.command)
    }
}

/// Run one command and render its output.
pub async fn execute<S: ReservationStore, L: RoomLocks>(
    service: &ReservationService<S, L>,
    command: Command,
) -> Result<String, EngineError> {
    match command {
        Command::AddRoom { id, name } => {
            let id = id.unwrap_or_else(Ulid::new);
            service.register_room(id, name).await?;
            Ok(id.to_string())
        }
        Command::Reserve {
            room,
            requester,
            from,
            until,
        } => {
            let id = service
                .make_reservation(MakeReservation::new(room, requester, from, until))
                .await?;
            Ok(id.to_string())
        }
        Command::IsReserved {
            room,
            requester,
            day,
        } => {
            let held = service
                .is_reserved(ReservationQuery::new(room, requester, day))
                .await?;
            Ok(if held { "yes" } else { "no" }.to_string())
        }
        Command::Count { requesters } => {
            let ids: HashSet<Ulid> = requesters.into_iter().collect();
            Ok(service.reservations_count(&ids).await?.to_string())
        }
        Command::Schedule { room, from, until } => {
            let window = match (from, until) {
                (Some(from), Some(until)) => Some(DateRange::new(from, until)?),
                _ => None,
            };
            let mut out = String::new();
            for r in service.room_schedule(room).await? {
                if window.is_some_and(|w| !w.contains_range(&r.range)) {
                    continue;
                }
                let _ = writeln!(out, "{} {} {}", r.id, r.range, r.requester_id);
            }
            Ok(out.trim_end().to_string())
        }
        Command::Shell => Err(EngineError::LimitExceeded("shell cannot be nested")),
    }
}
