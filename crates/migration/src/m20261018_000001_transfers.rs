//! `transfers`: the append-only log of money moved between wallets.

use sea_orm_migration::prelude::*;

use crate::m20261018_000000_wallets::Wallets;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Transfers {
    Table,
    Id,
    FromWallet,
    ToWallet,
    Amount,
    TransferredAt,
    IdempotencyKey,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transfers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transfers::FromWallet).string().not_null())
                    .col(ColumnDef::new(Transfers::ToWallet).string().not_null())
                    .col(ColumnDef::new(Transfers::Amount).string().not_null())
                    .col(
                        ColumnDef::new(Transfers::TransferredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transfers::IdempotencyKey).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfers-from_wallet")
                            .from(Transfers::Table, Transfers::FromWallet)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfers-to_wallet")
                            .from(Transfers::Table, Transfers::ToWallet)
                            .to(Wallets::Table, Wallets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // History is read newest first with `id` as tie breaker.
        manager
            .create_index(
                Index::create()
                    .name("idx-transfers-transferred_at-id")
                    .table(Transfers::Table)
                    .col(Transfers::TransferredAt)
                    .col(Transfers::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-transfers-idempotency_key")
                    .table(Transfers::Table)
                    .col(Transfers::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transfers::Table).to_owned())
            .await
    }
}
