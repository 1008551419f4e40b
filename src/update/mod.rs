pub mod driver;
pub mod snooze;
pub mod state;

pub use driver::UpdateDriver;
pub use snooze::{parse_duration_ms, snooze_active};
pub use state::{
    clients_up_to_date, notification_message, transition, Notification, UpdateEvent, UpdateSession, UpdateStatus,
};
