use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_campaigns_table::Migration),
            Box::new(m20240601_000002_create_coupons_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_campaigns_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_campaigns_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Campaigns::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Campaigns::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Campaigns::Name).string().not_null())
                        .col(ColumnDef::new(Campaigns::Slug).string().not_null())
                        .col(ColumnDef::new(Campaigns::CodePrefix).string().not_null())
                        .col(ColumnDef::new(Campaigns::Description).string().null())
                        .col(
                            ColumnDef::new(Campaigns::DiscountType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Campaigns::DiscountValue).decimal().not_null())
                        .col(ColumnDef::new(Campaigns::MaxDiscountCap).decimal().null())
                        .col(ColumnDef::new(Campaigns::MinPurchaseAmount).decimal().null())
                        .col(ColumnDef::new(Campaigns::EligibilityTags).json().not_null())
                        .col(
                            ColumnDef::new(Campaigns::ApplicableCategoryIds)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Campaigns::ApplicableItemIds)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Campaigns::MaxUsagePerUser)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Campaigns::MaxGlobalUsage).integer().null())
                        .col(
                            ColumnDef::new(Campaigns::IsUniquePerUser)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Campaigns::GlobalUsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Campaigns::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Campaigns::ValidUntil)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Campaigns::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Campaigns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Campaigns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_campaigns_slug")
                        .table(Campaigns::Table)
                        .col(Campaigns::Slug)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Campaigns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Campaigns {
        Table,
        Id,
        Name,
        Slug,
        CodePrefix,
        Description,
        DiscountType,
        DiscountValue,
        MaxDiscountCap,
        MinPurchaseAmount,
        EligibilityTags,
        ApplicableCategoryIds,
        ApplicableItemIds,
        MaxUsagePerUser,
        MaxGlobalUsage,
        IsUniquePerUser,
        GlobalUsageCount,
        ValidFrom,
        ValidUntil,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_coupons_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_coupons_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::CampaignId).uuid().not_null())
                        .col(ColumnDef::new(Coupons::UserId).uuid().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::CurrentUsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Coupons::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Coupons::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::AssignedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::LastUsageAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_coupons_campaign")
                                .from(Coupons::Table, Coupons::CampaignId)
                                .to(Campaigns::Table, Campaigns::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            // Lookup index for the unique-per-user issuance check
            manager
                .create_index(
                    Index::create()
                        .name("idx_coupons_campaign_user")
                        .table(Coupons::Table)
                        .col(Coupons::CampaignId)
                        .col(Coupons::UserId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        CampaignId,
        UserId,
        Code,
        CurrentUsageCount,
        IsActive,
        ExpiresAt,
        AssignedAt,
        LastUsageAt,
    }

    #[derive(DeriveIden)]
    enum Campaigns {
        Table,
        Id,
    }
}
