use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{pk_auto, string, timestamp};
use sea_orm_migration::sea_query::Expr;

/// One logical phone call, keyed by the provider's call SID. Rows are
/// created on the first audit write for a SID and never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "infoline_calls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    #[sea_orm(unique)]
    pub sid: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::call_log::Entity")]
    CallLog,
}

impl Related<super::call_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CallLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entity)
                    .if_not_exists()
                    .col(pk_auto(Column::Id))
                    .col(string(Column::Sid).char_len(64))
                    .col(timestamp(Column::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // ON CONFLICT(sid) in ensure_call relies on this index.
        manager
            .create_index(
                Index::create()
                    .name("idx_infoline_calls_sid")
                    .table(Entity)
                    .col(Column::Sid)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Entity).to_owned())
            .await
    }
}
