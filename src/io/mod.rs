pub mod channel;
pub mod console;
pub mod email;
pub mod input;
pub mod journal;
pub mod sms;
pub mod smtp;
pub mod speech;
pub mod telegram;
pub mod twilio;
pub mod voice;
pub mod watcher;
