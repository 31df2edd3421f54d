use chrono::{Datelike, Duration, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::limits::{OPEN_FROM_HOUR, OPEN_UNTIL_HOUR};
use crate::model::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    #[default]
    Week,
    Month,
}

/// Handle onto whatever renders the calendar. The core only issues intents through it.
pub trait CalendarView: Send + Sync {
    fn set_view(&self, mode: ViewMode);
}

/// One event as the calendar widget draws it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl From<&Reservation> for CalendarEvent {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id.to_string(),
            title: r.title(),
            start: r.span.start,
            end: r.span.end,
        }
    }
}

pub fn project<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Vec<CalendarEvent> {
    reservations.into_iter().map(CalendarEvent::from).collect()
}

/// Header figures shown above the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_bookings: usize,
    pub unique_pics: usize,
    pub hours_this_week: f64,
    /// Share of this week's opening hours that are booked, 0.0..=1.0.
    pub utilisation: f64,
}

/// Sunday 00:00 of the week containing `now`.
pub fn week_start(now: Timestamp) -> Timestamp {
    let days_back = now.weekday().num_days_from_sunday() as i64;
    (now.date() - Duration::days(days_back)).and_time(NaiveTime::MIN)
}

/// A booking counts toward a week when it starts inside it.
pub fn stats<'a>(reservations: impl IntoIterator<Item = &'a Reservation>, now: Timestamp) -> Stats {
    let from = week_start(now);
    let until = from + Duration::days(7);
    let mut total = 0;
    let mut pics = std::collections::HashSet::new();
    let mut hours = 0.0;
    for r in reservations {
        total += 1;
        pics.insert(r.pic.as_str());
        if r.span.start >= from && r.span.start < until {
            hours += r.span.hours();
        }
    }
    let open_hours = f64::from(OPEN_UNTIL_HOUR - OPEN_FROM_HOUR) * 7.0;
    Stats {
        total_bookings: total,
        unique_pics: pics.len(),
        hours_this_week: hours,
        utilisation: (hours / open_hours).min(1.0),
    }
}
