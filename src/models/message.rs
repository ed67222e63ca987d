use sea_orm::entity::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::{big_integer_null, pk_auto, text, timestamp};
use sea_orm_migration::sea_query::Expr;
use sea_orm_migration::sea_query::ForeignKeyAction as MigrationForeignKeyAction;

/// A scheduled announcement, in effect over `[active_from, active_until)`.
/// When `forward_to` is set, calls bypass the menu and dial that human.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "infoline_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i64,
    pub active_from: DateTimeUtc,
    pub active_until: DateTimeUtc,
    #[sea_orm(column_type = "Text")]
    pub web_short_text: String,
    #[sea_orm(column_type = "Text")]
    pub web_long_text: String,
    #[sea_orm(column_type = "Text")]
    pub call_text: String,
    pub forward_to: Option<i64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::human::Entity",
        from = "Column::ForwardTo",
        to = "super::human::Column::Id",
        on_delete = "SetNull",
        on_update = "Cascade"
    )]
    ForwardTo,
}

impl Related<super::human::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ForwardTo.def()
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
                    .col(timestamp(Column::ActiveFrom))
                    .col(timestamp(Column::ActiveUntil))
                    .col(text(Column::WebShortText))
                    .col(text(Column::WebLongText))
                    .col(text(Column::CallText))
                    .col(big_integer_null(Column::ForwardTo))
                    .col(timestamp(Column::CreatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_infoline_messages_forward_to")
                            .from(Entity, Column::ForwardTo)
                            .to(super::human::Entity, super::human::Column::Id)
                            .on_delete(MigrationForeignKeyAction::SetNull)
                            .on_update(MigrationForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_infoline_messages_active")
                    .table(Entity)
                    .col(Column::ActiveFrom)
                    .col(Column::ActiveUntil)
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
