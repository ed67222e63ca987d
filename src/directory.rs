use crate::error::{CallFlowError, Result};
use crate::models::{human, message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::{fmt, str::FromStr};
use tracing::warn;

/// A dialable number in E.164 shape: `+` followed by 1 to 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PhoneNumber {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('+')
            .ok_or_else(|| anyhow::anyhow!("phone number {:?} must start with +", s))?;
        if digits.is_empty() || digits.len() > 15 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(anyhow::anyhow!("phone number {:?} is not +<digits>", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Human {
    pub id: i64,
    pub name: String,
    pub phone: PhoneNumber,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub name: String,
    pub phone: PhoneNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMessage {
    pub id: i64,
    pub active_from: DateTime<Utc>,
    pub active_until: DateTime<Utc>,
    pub web_short_text: String,
    pub web_long_text: String,
    pub call_text: String,
    pub forward_to: Option<ForwardTarget>,
}

/// Read-only view of the operator list and the announcement schedule.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    /// The message whose validity range contains `now`. Overlapping
    /// messages are reported as `ScheduleConflict`, never resolved.
    async fn active_message(&self, now: DateTime<Utc>) -> Result<Option<ActiveMessage>>;
    /// Humans with a non-zero priority, in creation order.
    async fn enabled_humans(&self) -> Result<Vec<Human>>;
}

pub struct DbDirectory {
    db: DatabaseConnection,
}

impl DbDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_human(model: human::Model) -> Option<Human> {
        match model.phone.parse::<PhoneNumber>() {
            Ok(phone) => Some(Human {
                id: model.id,
                name: model.name,
                phone,
                priority: model.priority.max(0) as u32,
            }),
            Err(e) => {
                warn!(human_id = model.id, "skipping human: {}", e);
                None
            }
        }
    }

    async fn forward_target(&self, human_id: i64) -> Result<Option<ForwardTarget>> {
        let human = human::Entity::find_by_id(human_id).one(&self.db).await?;
        match human.and_then(Self::to_human) {
            Some(human) => Ok(Some(ForwardTarget {
                name: human.name,
                phone: human.phone,
            })),
            None => {
                warn!(human_id, "forward target unavailable, using the menu");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Directory for DbDirectory {
    async fn active_message(&self, now: DateTime<Utc>) -> Result<Option<ActiveMessage>> {
        let mut models = message::Entity::find()
            .filter(message::Column::ActiveFrom.lte(now))
            .filter(message::Column::ActiveUntil.gt(now))
            .order_by_asc(message::Column::Id)
            .all(&self.db)
            .await?;

        if models.len() > 1 {
            return Err(CallFlowError::ScheduleConflict {
                at: now,
                ids: models.iter().map(|m| m.id).collect(),
            });
        }
        let Some(model) = models.pop() else {
            return Ok(None);
        };

        let forward_to = match model.forward_to {
            Some(human_id) => self.forward_target(human_id).await?,
            None => None,
        };
        Ok(Some(ActiveMessage {
            id: model.id,
            active_from: model.active_from,
            active_until: model.active_until,
            web_short_text: model.web_short_text,
            web_long_text: model.web_long_text,
            call_text: model.call_text,
            forward_to,
        }))
    }

    async fn enabled_humans(&self) -> Result<Vec<Human>> {
        let models = human::Entity::find()
            .filter(human::Column::Priority.gt(0))
            .order_by_asc(human::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().filter_map(Self::to_human).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::create_db;
    use chrono::Duration;
    use sea_orm::{ActiveModelTrait, Set};

    async fn add_human(db: &DatabaseConnection, name: &str, phone: &str, priority: i32) -> i64 {
        human::ActiveModel {
            name: Set(name.to_string()),
            phone: Set(phone.to_string()),
            priority: Set(priority),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn add_message(
        db: &DatabaseConnection,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        forward_to: Option<i64>,
    ) -> i64 {
        message::ActiveModel {
            active_from: Set(from),
            active_until: Set(until),
            web_short_text: Set("Launch Saturday".to_string()),
            web_long_text: Set("We are launching on Saturday morning.".to_string()),
            call_text: Set("We are launching on Saturday.".to_string()),
            forward_to: Set(forward_to),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    #[test]
    fn test_phone_number_parse() {
        assert_eq!(
            "+447700900123".parse::<PhoneNumber>().unwrap().as_str(),
            "+447700900123"
        );
        assert!("07700900123".parse::<PhoneNumber>().is_err());
        assert!("+".parse::<PhoneNumber>().is_err());
        assert!("+44 7700 900123".parse::<PhoneNumber>().is_err());
        assert!("+1234567890123456".parse::<PhoneNumber>().is_err());
    }

    #[tokio::test]
    async fn test_enabled_humans_filters_and_orders() {
        let db = create_db("sqlite::memory:").await.unwrap();
        add_human(&db, "alice", "+441111111111", 2).await;
        add_human(&db, "bob", "+442222222222", 0).await;
        add_human(&db, "carol", "not-a-number", 1).await;
        add_human(&db, "dave", "+443333333333", 1).await;

        let humans = DbDirectory::new(db).enabled_humans().await.unwrap();
        let names: Vec<_> = humans.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "dave"]);
        assert_eq!(humans[0].priority, 2);
    }

    #[tokio::test]
    async fn test_active_message_range_is_half_open() {
        let db = create_db("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let id = add_message(&db, now - Duration::hours(1), now + Duration::hours(1), None).await;
        add_message(&db, now + Duration::hours(1), now + Duration::hours(2), None).await;
        let directory = DbDirectory::new(db);

        let active = directory.active_message(now).await.unwrap().unwrap();
        assert_eq!(active.id, id);
        assert!(active.forward_to.is_none());
        assert!(directory
            .active_message(now - Duration::hours(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_active_message_resolves_forward_target() {
        let db = create_db("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let human_id = add_human(&db, "alice", "+441111111111", 0).await;
        add_message(
            &db,
            now - Duration::minutes(5),
            now + Duration::minutes(5),
            Some(human_id),
        )
        .await;

        let active = DbDirectory::new(db).active_message(now).await.unwrap().unwrap();
        let target = active.forward_to.unwrap();
        assert_eq!(target.name, "alice");
        assert_eq!(target.phone.as_str(), "+441111111111");
    }

    #[tokio::test]
    async fn test_overlapping_messages_fail_loudly() {
        let db = create_db("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        add_message(&db, now - Duration::hours(2), now + Duration::hours(1), None).await;
        add_message(&db, now - Duration::hours(1), now + Duration::hours(2), None).await;

        let err = DbDirectory::new(db).active_message(now).await.unwrap_err();
        match err {
            CallFlowError::ScheduleConflict { ids, .. } => assert_eq!(ids.len(), 2),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
