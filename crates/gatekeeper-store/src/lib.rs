pub mod error;
pub mod history;
pub mod journal;
pub mod mailbox;
pub mod memory;

pub use error::StoreError;
pub use history::{SqliteTradeHistory, TradeHistory};
pub use journal::{JournalReader, JournalWriter};
pub use mailbox::{CommandLookup, CommandMailbox, MalformedCommand, PendingCommand, ReadyCommand};
