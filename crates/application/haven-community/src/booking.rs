//! Counselor appointment requests

use crate::{CommunityError, Member, Result};
use chrono::NaiveDate;
use haven_core::{FeedItem, Record, SharedStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const STATUS: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counselor {
    pub id: &'static str,
    pub name: &'static str,
    pub specialization: &'static str,
}

/// Counselors taking appointments
pub const COUNSELORS: [Counselor; 3] = [
    Counselor {
        id: "c1",
        name: "Dr. Sarah",
        specialization: "Anxiety & Depression",
    },
    Counselor {
        id: "c2",
        name: "Dr. Michael",
        specialization: "Stress Management",
    },
    Counselor {
        id: "c3",
        name: "Dr. Emily",
        specialization: "Student Counseling",
    },
];

impl Counselor {
    pub fn find(id: &str) -> Option<&'static Counselor> {
        COUNSELORS.iter().find(|c| c.id == id)
    }
}

/// Hourly appointment slot, 9:00 through 17:00
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSlot {
    hour: u8,
}

impl TimeSlot {
    pub const FIRST_HOUR: u8 = 9;
    pub const LAST_HOUR: u8 = 17;

    pub fn new(hour: u8) -> Option<Self> {
        (Self::FIRST_HOUR..=Self::LAST_HOUR)
            .contains(&hour)
            .then_some(Self { hour })
    }

    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (Self::FIRST_HOUR..=Self::LAST_HOUR).map(|hour| TimeSlot { hour })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    /// Stored form, e.g. `14:00`
    pub fn value(self) -> String {
        format!("{}:00", self.hour)
    }

    /// Display form, e.g. `2:00 PM`
    pub fn label(self) -> String {
        let suffix = if self.hour >= 12 { "PM" } else { "AM" };
        let hour = if self.hour > 12 { self.hour - 12 } else { self.hour };
        format!("{}:00 {}", hour, suffix)
    }
}

impl FromStr for TimeSlot {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self> {
        let hour = s.trim().strip_suffix(":00").unwrap_or(s.trim());
        hour.parse::<u8>()
            .ok()
            .and_then(TimeSlot::new)
            .ok_or_else(|| CommunityError::Invalid(format!("'{}' is not an available time", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn of(item: &FeedItem) -> Option<Self> {
        item.text(STATUS).and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "approved" => Ok(BookingStatus::Approved),
            "rejected" => Ok(BookingStatus::Rejected),
            other => Err(CommunityError::Invalid(format!("unknown booking status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub counselor_id: String,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub notes: String,
}

pub struct BookingDesk {
    store: SharedStore,
    collection: String,
}

impl BookingDesk {
    pub fn new(store: SharedStore, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    /// File a pending request; `today` bounds the earliest bookable date
    pub async fn request(
        &self,
        member: &Member,
        request: BookingRequest,
        today: NaiveDate,
    ) -> Result<String> {
        let counselor = Counselor::find(&request.counselor_id).ok_or_else(|| {
            CommunityError::Invalid(format!("unknown counselor '{}'", request.counselor_id))
        })?;
        if request.date < today {
            return Err(CommunityError::Invalid(format!(
                "{} is in the past",
                request.date
            )));
        }

        let record = Record::new()
            .with("userId", member.uid.as_str())
            .with("userEmail", member.email.as_str())
            .with("counselorId", counselor.id)
            .with("counselorName", counselor.name)
            .with("date", request.date.format("%Y-%m-%d").to_string())
            .with("time", request.time.value())
            .with("notes", request.notes.trim())
            .with(STATUS, BookingStatus::Pending.as_str());

        let id = self.store.insert(&self.collection, record).await?;
        tracing::info!(
            "Booking {} requested with {} on {} at {}",
            id,
            counselor.name,
            request.date,
            request.time.label()
        );
        Ok(id)
    }
}
