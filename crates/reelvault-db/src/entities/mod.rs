//! One module per catalog entity.
//!
//! Every module owns its table/trigger/index SQL (model-version
//! parameterized, collected by the registry), its row struct with
//! `from_row`, and its operations. Mutations take a `&Connection` (the
//! caller holds the write context), listings take a `&Database` and
//! return paginated queries.

pub mod album;
pub mod album_track;
pub mod artist;
pub mod bookmark;
pub mod chapter;
pub mod device;
pub mod file;
pub mod folder;
pub mod genre;
pub mod label;
pub mod media;
pub mod media_group;
pub mod metadata;
pub mod movie;
pub mod playlist;
pub mod settings;
pub mod show;
pub mod subscription;
pub mod thumbnail;
pub mod tracks;
pub mod video_group;
