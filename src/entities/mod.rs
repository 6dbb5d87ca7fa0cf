pub mod job_song_failure;
pub mod notification;
pub mod playlist;
pub mod playlist_export_target;
pub mod playlist_share;
pub mod playlist_song;
pub mod provider_connection;
pub mod reconciliation_job;
pub mod song_export_state;
pub mod user;
