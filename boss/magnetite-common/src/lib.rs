mod bytes_cow;
mod torrent;
mod torrent_id;
pub mod proto;

pub use self::bytes_cow::BytesCow;
pub use self::torrent::{TorrentMeta, TorrentMetaInfo, TorrentMetaInfoFile};
pub use self::torrent_id::{TorrentId, TorrentIdError};