use sea_orm_migration::prelude::*;

/// Tables the certificate pipeline reads and writes: CDNs and delivery
/// services, ACME accounts, DNS challenges, async job status, the change
/// log and the database-backed key vault.
#[derive(DeriveMigrationName)]
pub struct Migration;

fn id_column() -> ColumnDef {
    ColumnDef::new(Alias::new("id"))
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn now_column(name: &str) -> ColumnDef {
    ColumnDef::new(Alias::new(name))
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("cdn"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(
                        ColumnDef::new(Alias::new("name"))
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Alias::new("domain_name")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("dnssec_enabled"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("deliveryservice"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(
                        ColumnDef::new(Alias::new("xml_id"))
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Alias::new("cdn_id")).integer().not_null())
                    .col(
                        ColumnDef::new(Alias::new("ssl_key_version"))
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Alias::new("example_url")).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deliveryservice_cdn_id")
                            .from(Alias::new("deliveryservice"), Alias::new("cdn_id"))
                            .to(Alias::new("cdn"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("cdn_lock"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("cdn"))
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("username")).string().not_null())
                    .col(ColumnDef::new(Alias::new("message")).text().null())
                    .col(
                        ColumnDef::new(Alias::new("soft"))
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(&mut now_column("created_at"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("acme_account"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(ColumnDef::new(Alias::new("email")).string().not_null())
                    .col(ColumnDef::new(Alias::new("private_key")).text().not_null())
                    .col(ColumnDef::new(Alias::new("uri")).string().not_null())
                    .col(ColumnDef::new(Alias::new("provider")).string().not_null())
                    .col(&mut now_column("last_updated"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_acme_account_email_provider")
                    .table(Alias::new("acme_account"))
                    .col(Alias::new("email"))
                    .col(Alias::new("provider"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("dnschallenges"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(ColumnDef::new(Alias::new("fqdn")).string().not_null())
                    .col(ColumnDef::new(Alias::new("record")).string().not_null())
                    .col(ColumnDef::new(Alias::new("xml_id")).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dnschallenges_fqdn")
                    .table(Alias::new("dnschallenges"))
                    .col(Alias::new("fqdn"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("async_status"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(ColumnDef::new(Alias::new("status")).string().not_null())
                    .col(ColumnDef::new(Alias::new("message")).text().null())
                    .col(&mut now_column("start_time"))
                    .col(
                        ColumnDef::new(Alias::new("end_time"))
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("log"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(ColumnDef::new(Alias::new("level")).string().not_null())
                    .col(ColumnDef::new(Alias::new("message")).text().not_null())
                    .col(ColumnDef::new(Alias::new("username")).string().not_null())
                    .col(&mut now_column("last_updated"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("sslkey"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(
                        ColumnDef::new(Alias::new("deliveryservice"))
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("cdn")).string().not_null())
                    .col(ColumnDef::new(Alias::new("version")).string().not_null())
                    .col(ColumnDef::new(Alias::new("data")).json().not_null())
                    .col(&mut now_column("last_updated"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sslkey_deliveryservice_version")
                    .table(Alias::new("sslkey"))
                    .col(Alias::new("deliveryservice"))
                    .col(Alias::new("version"))
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("dnssec"))
                    .if_not_exists()
                    .col(&mut id_column())
                    .col(
                        ColumnDef::new(Alias::new("cdn"))
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Alias::new("data")).json().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse order so the delivery service foreign key goes before cdn
        for table in [
            "dnssec",
            "sslkey",
            "log",
            "async_status",
            "dnschallenges",
            "acme_account",
            "cdn_lock",
            "deliveryservice",
            "cdn",
        ] {
            manager
                .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}
