//! Booking domain logic shared by the API: calendar grids, fixed time slots,
//! package naming and quotes. Nothing here touches the database.

pub mod calendar;
pub mod packages;

pub use calendar::{
    days_in_month, first_weekday_offset, month_grid, normalize_time_label, parse_booking_date,
    parse_time_label, CalendarError, MonthGrid, TimeSlot, TIME_SLOTS,
};
pub use packages::{get_package_name, quote, ModuleSelection, Quote, VehicleSize};
