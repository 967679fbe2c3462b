// src/reminders/mod.rs

pub mod scanner;

pub use scanner::{
    AppointmentOutcome, REMINDER_SUBJECT, RemindError, ReminderOutcome, ReminderScanner, ScanMode,
    ScanReport,
};
