use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LocalRecord::Table)
                    .if_not_exists()
                    .col(string(LocalRecord::Key).primary_key())
                    .col(text(LocalRecord::Value))
                    .col(timestamp_with_time_zone(LocalRecord::UpdatedAt))
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LocalRecord::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum LocalRecord {
    Table,
    Key,
    Value,
    UpdatedAt,
}
