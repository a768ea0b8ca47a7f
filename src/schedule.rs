use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use crate::models::EventRecord;

const DEFAULT_OFFSETS: [u32; 3] = [13, 7, 0];

/// Days before an event on which a reminder goes out. Iterates ascending;
/// duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderOffsets(BTreeSet<u32>);

impl ReminderOffsets {
    pub fn new(days: impl IntoIterator<Item = u32>) -> Self {
        Self(days.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ReminderOffsets {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSETS)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DueReminder<'a> {
    pub index: usize, // position of `event` in the scheduled slice
    pub event: &'a EventRecord,
    pub offset_days: u32,
}

/// Date on which the reminder `offset_days` before `event` fires.
pub fn trigger_date(event: &EventRecord, offset_days: u32) -> Option<NaiveDate> {
    event
        .event_date()
        .checked_sub_days(Days::new(u64::from(offset_days)))
}

/// Reminders that fire on `today`, in event order then ascending offset.
/// A trigger date that has passed is never revisited.
pub fn due_today<'a>(
    today: NaiveDate,
    events: &'a [EventRecord],
    offsets: &ReminderOffsets,
) -> Vec<DueReminder<'a>> {
    let mut due = Vec::new();
    for (index, event) in events.iter().enumerate() {
        for offset_days in offsets.iter() {
            if trigger_date(event, offset_days) == Some(today) {
                due.push(DueReminder {
                    index,
                    event,
                    offset_days,
                });
            }
        }
    }
    due
}
