//! Domain model (remote entries, retention, phases, errors).

pub mod entry;
pub mod errors;
pub mod retention;
pub mod state;

pub use self::entry::{EntryId, EntryKind, EntryPage, PageRequest, RemoteEntry, FOLDER_MIME_TYPE};
pub use self::errors::{DownloadError, ErrorKind, FetchError, SetupError, TickError};
pub use self::retention::{parse_date_prefix, ParseIntervalError, RetentionInterval};
pub use self::state::Phase;
