use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::FetchError;
use crate::models::Fixture;

/// Remote source of fixture lists.
///
/// May be slow, may fail, and may legitimately return zero fixtures for a
/// day. Returned fixtures keep the provider's order.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    async fn fetch(
        &self,
        date: NaiveDate,
        league_filter: Option<&[i64]>,
    ) -> Result<Vec<Fixture>, FetchError>;
}
