pub mod availability;
pub mod booking;
pub mod extraction;
pub mod schedule;
pub mod service;
pub mod session;

pub use availability::{SlotSpan, TimeSlot};
pub use booking::{Booking, BookingFilter, BookingStatus, Customer, NewBooking, Paging};
pub use extraction::ExtractedFields;
pub use schedule::{Blackout, BusinessHours};
pub use service::Service;
pub use session::{next_step, BookingSlot, BookingStep, ConversationMessage, ConversationSession};
