use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{big_integer, pk_auto, text, timestamp};
use sea_orm_migration::sea_query::ForeignKeyAction as MigrationForeignKeyAction;

/// One audit line. `id` doubles as the insertion sequence and breaks ties
/// between lines of the same call that share a timestamp.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "infoline_call_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub call_id: i64,
    pub logged_at: DateTimeUtc,
    #[sea_orm(column_type = "Text")]
    pub message: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::call::Entity",
        from = "Column::CallId",
        to = "super::call::Column::Id",
        on_delete = "Restrict",
        on_update = "Cascade"
    )]
    Call,
}

impl Related<super::call::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Call.def()
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
                    .col(big_integer(Column::CallId))
                    .col(timestamp(Column::LoggedAt))
                    .col(text(Column::Message))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_infoline_call_log_call")
                            .from(Entity, Column::CallId)
                            .to(super::call::Entity, super::call::Column::Id)
                            .on_delete(MigrationForeignKeyAction::Restrict)
                            .on_update(MigrationForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_infoline_call_log_order")
                    .table(Entity)
                    .col(Column::CallId)
                    .col(Column::LoggedAt)
                    .col(Column::Id)
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
