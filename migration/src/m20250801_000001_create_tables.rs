use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(User::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(User::Username).string().not_null().unique_key())
                    .col(ColumnDef::new(User::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(User::AvatarUrl).string())
                    .col(ColumnDef::new(User::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(User::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Create playlists table
        manager
            .create_table(
                Table::create()
                    .table(Playlist::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Playlist::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Playlist::Name).string().not_null())
                    .col(ColumnDef::new(Playlist::Description).string())
                    .col(ColumnDef::new(Playlist::CoverImageUrl).string())
                    .col(ColumnDef::new(Playlist::CreatorId).integer().not_null())
                    .col(
                        ColumnDef::new(Playlist::IsPublic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Playlist::SourceProvider).string().not_null())
                    .col(ColumnDef::new(Playlist::SourcePlaylistId).string())
                    .col(ColumnDef::new(Playlist::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Playlist::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlists_creator_id")
                            .from(Playlist::Table, Playlist::CreatorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create playlist_shares junction table
        manager
            .create_table(
                Table::create()
                    .table(PlaylistShare::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PlaylistShare::PlaylistId).integer().not_null())
                    .col(ColumnDef::new(PlaylistShare::UserId).integer().not_null())
                    .col(ColumnDef::new(PlaylistShare::CreatedAt).timestamp().not_null())
                    .primary_key(
                        Index::create()
                            .col(PlaylistShare::PlaylistId)
                            .col(PlaylistShare::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_shares_playlist_id")
                            .from(PlaylistShare::Table, PlaylistShare::PlaylistId)
                            .to(Playlist::Table, Playlist::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_shares_user_id")
                            .from(PlaylistShare::Table, PlaylistShare::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create playlist_songs table
        manager
            .create_table(
                Table::create()
                    .table(PlaylistSong::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlaylistSong::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlaylistSong::PlaylistId).integer().not_null())
                    .col(ColumnDef::new(PlaylistSong::Position).integer().not_null())
                    .col(ColumnDef::new(PlaylistSong::Title).string().not_null())
                    .col(ColumnDef::new(PlaylistSong::Artist).string().not_null())
                    .col(ColumnDef::new(PlaylistSong::Album).string())
                    .col(ColumnDef::new(PlaylistSong::DurationSeconds).integer())
                    .col(ColumnDef::new(PlaylistSong::CoverImageUrl).string())
                    .col(ColumnDef::new(PlaylistSong::SpotifyId).string())
                    .col(ColumnDef::new(PlaylistSong::AppleMusicId).string())
                    .col(ColumnDef::new(PlaylistSong::AmazonMusicId).string())
                    .col(ColumnDef::new(PlaylistSong::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(PlaylistSong::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_songs_playlist_id")
                            .from(PlaylistSong::Table, PlaylistSong::PlaylistId)
                            .to(Playlist::Table, Playlist::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create provider_connections table
        manager
            .create_table(
                Table::create()
                    .table(ProviderConnection::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderConnection::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderConnection::UserId).integer().not_null())
                    .col(ColumnDef::new(ProviderConnection::Provider).string().not_null())
                    .col(
                        ColumnDef::new(ProviderConnection::Connected)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ProviderConnection::AccessToken).string())
                    .col(ColumnDef::new(ProviderConnection::RefreshToken).string())
                    .col(ColumnDef::new(ProviderConnection::ProviderUserId).string())
                    .col(ColumnDef::new(ProviderConnection::ExpiresAt).timestamp())
                    .col(ColumnDef::new(ProviderConnection::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ProviderConnection::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_connections_user_id")
                            .from(ProviderConnection::Table, ProviderConnection::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create reconciliation_jobs table
        manager
            .create_table(
                Table::create()
                    .table(ReconciliationJob::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationJob::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReconciliationJob::Operation).string().not_null())
                    .col(ColumnDef::new(ReconciliationJob::UserId).integer().not_null())
                    .col(ColumnDef::new(ReconciliationJob::SourceProvider).string())
                    .col(ColumnDef::new(ReconciliationJob::TargetProvider).string())
                    .col(ColumnDef::new(ReconciliationJob::PlaylistId).integer())
                    .col(ColumnDef::new(ReconciliationJob::ProviderPlaylistId).string())
                    .col(
                        ColumnDef::new(ReconciliationJob::SongsTotal)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReconciliationJob::SongsProcessed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ReconciliationJob::Status).string().not_null())
                    .col(ColumnDef::new(ReconciliationJob::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ReconciliationJob::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reconciliation_jobs_user_id")
                            .from(ReconciliationJob::Table, ReconciliationJob::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create job_song_failures table
        manager
            .create_table(
                Table::create()
                    .table(JobSongFailure::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobSongFailure::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobSongFailure::JobId).integer().not_null())
                    .col(ColumnDef::new(JobSongFailure::Position).integer())
                    .col(ColumnDef::new(JobSongFailure::Title).string().not_null())
                    .col(ColumnDef::new(JobSongFailure::Artist).string().not_null())
                    .col(ColumnDef::new(JobSongFailure::Reason).string().not_null())
                    .col(ColumnDef::new(JobSongFailure::Detail).string())
                    .col(ColumnDef::new(JobSongFailure::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_song_failures_job_id")
                            .from(JobSongFailure::Table, JobSongFailure::JobId)
                            .to(ReconciliationJob::Table, ReconciliationJob::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create song_export_states table
        manager
            .create_table(
                Table::create()
                    .table(SongExportState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SongExportState::PlaylistSongId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SongExportState::Provider).string().not_null())
                    .col(
                        ColumnDef::new(SongExportState::ProviderPlaylistId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SongExportState::AddedAt).timestamp().not_null())
                    .primary_key(
                        Index::create()
                            .col(SongExportState::PlaylistSongId)
                            .col(SongExportState::Provider),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_song_export_states_playlist_song_id")
                            .from(SongExportState::Table, SongExportState::PlaylistSongId)
                            .to(PlaylistSong::Table, PlaylistSong::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create playlist_export_targets table
        manager
            .create_table(
                Table::create()
                    .table(PlaylistExportTarget::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlaylistExportTarget::PlaylistId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlaylistExportTarget::Provider)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlaylistExportTarget::ProviderPlaylistId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlaylistExportTarget::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PlaylistExportTarget::PlaylistId)
                            .col(PlaylistExportTarget::Provider),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_export_targets_playlist_id")
                            .from(PlaylistExportTarget::Table, PlaylistExportTarget::PlaylistId)
                            .to(Playlist::Table, Playlist::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create notifications table
        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notification::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notification::Kind).string().not_null())
                    .col(ColumnDef::new(Notification::SenderId).integer().not_null())
                    .col(ColumnDef::new(Notification::RecipientId).integer().not_null())
                    .col(ColumnDef::new(Notification::Payload).string().not_null())
                    .col(
                        ColumnDef::new(Notification::Read)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Notification::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Notification::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_sender_id")
                            .from(Notification::Table, Notification::SenderId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_recipient_id")
                            .from(Notification::Table, Notification::RecipientId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create indexes
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_playlists_creator_id")
                    .table(Playlist::Table)
                    .col(Playlist::CreatorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_playlist_shares_user_id")
                    .table(PlaylistShare::Table)
                    .col(PlaylistShare::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_playlist_songs_playlist_id")
                    .table(PlaylistSong::Table)
                    .col(PlaylistSong::PlaylistId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_provider_connections_user_provider")
                    .table(ProviderConnection::Table)
                    .col(ProviderConnection::UserId)
                    .col(ProviderConnection::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_reconciliation_jobs_user_id")
                    .table(ReconciliationJob::Table)
                    .col(ReconciliationJob::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_song_failures_job_id")
                    .table(JobSongFailure::Table)
                    .col(JobSongFailure::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_notifications_recipient_id")
                    .table(Notification::Table)
                    .col(Notification::RecipientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlaylistExportTarget::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SongExportState::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(JobSongFailure::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReconciliationJob::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProviderConnection::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlaylistSong::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlaylistShare::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Playlist::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    Email,
    AvatarUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Playlist {
    #[sea_orm(iden = "playlists")]
    Table,
    Id,
    Name,
    Description,
    CoverImageUrl,
    CreatorId,
    IsPublic,
    SourceProvider,
    SourcePlaylistId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlaylistShare {
    #[sea_orm(iden = "playlist_shares")]
    Table,
    PlaylistId,
    UserId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PlaylistSong {
    #[sea_orm(iden = "playlist_songs")]
    Table,
    Id,
    PlaylistId,
    Position,
    Title,
    Artist,
    Album,
    DurationSeconds,
    CoverImageUrl,
    SpotifyId,
    AppleMusicId,
    AmazonMusicId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProviderConnection {
    #[sea_orm(iden = "provider_connections")]
    Table,
    Id,
    UserId,
    Provider,
    Connected,
    AccessToken,
    RefreshToken,
    ProviderUserId,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ReconciliationJob {
    #[sea_orm(iden = "reconciliation_jobs")]
    Table,
    Id,
    Operation,
    UserId,
    SourceProvider,
    TargetProvider,
    PlaylistId,
    ProviderPlaylistId,
    SongsTotal,
    SongsProcessed,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum JobSongFailure {
    #[sea_orm(iden = "job_song_failures")]
    Table,
    Id,
    JobId,
    Position,
    Title,
    Artist,
    Reason,
    Detail,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SongExportState {
    #[sea_orm(iden = "song_export_states")]
    Table,
    PlaylistSongId,
    Provider,
    ProviderPlaylistId,
    AddedAt,
}

#[derive(DeriveIden)]
enum PlaylistExportTarget {
    #[sea_orm(iden = "playlist_export_targets")]
    Table,
    PlaylistId,
    Provider,
    ProviderPlaylistId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Notification {
    #[sea_orm(iden = "notifications")]
    Table,
    Id,
    Kind,
    SenderId,
    RecipientId,
    Payload,
    Read,
    CreatedAt,
    UpdatedAt,
}
