use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::appointments::AppointmentDetail;
use crate::models::AppointmentStatus;

/// Snaps any date to the Monday of its week.
pub fn week_start(anchor: NaiveDate) -> NaiveDate {
    anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()))
}

/// The 7 contiguous days of the week containing `anchor`, Monday first.
pub fn week_days(anchor: NaiveDate) -> [NaiveDate; 7] {
    let start = week_start(anchor);
    std::array::from_fn(|i| start + Duration::days(i as i64))
}

pub fn on_day(appointments: &[AppointmentDetail], day: NaiveDate) -> Vec<AppointmentDetail> {
    appointments
        .iter()
        .filter(|a| a.appointment_date == day)
        .cloned()
        .collect()
}

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub appointments: usize,
    pub revenue: f64,
}

/// Count and revenue for one day of the fetched week, cancelled excluded.
pub fn stats_for_day(appointments: &[AppointmentDetail], day: NaiveDate) -> Stats {
    collect(
        appointments
            .iter()
            .filter(|a| a.appointment_date == day),
    )
}

/// Count and revenue over the whole fetched week, cancelled excluded.
pub fn stats_for_week(appointments: &[AppointmentDetail]) -> Stats {
    collect(appointments.iter())
}

fn collect<'a>(appointments: impl Iterator<Item = &'a AppointmentDetail>) -> Stats {
    appointments
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .fold(Stats::default(), |stats, a| Stats {
            appointments: stats.appointments + 1,
            revenue: stats.revenue + a.total_price,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(date: NaiveDate, status: AppointmentStatus, total: f64) -> AppointmentDetail {
        AppointmentDetail {
            id: crate::auth::new_id(),
            appointment_date: date,
            appointment_time: "09:00".to_string(),
            status,
            total_price: total,
            notes: None,
            created_at: String::new(),
            barber_id: "b1".to_string(),
            barber_name: "Carlos".to_string(),
            barber_image_url: None,
            client_name: None,
            client_phone: None,
            services: Vec::new(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn any_anchor_snaps_to_monday() {
        // 2025-03-10 is a Monday.
        let monday = day(2025, 3, 10);
        assert_eq!(week_start(monday), monday);
        assert_eq!(week_start(day(2025, 3, 12)), monday);
        assert_eq!(week_start(day(2025, 3, 16)), monday);

        let days = week_days(day(2025, 3, 13));
        assert_eq!(days[0], monday);
        assert_eq!(days[6], day(2025, 3, 16));
        for pair in days.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }

    #[test]
    fn aggregates_exclude_cancelled() {
        let monday = day(2025, 3, 10);
        let tuesday = day(2025, 3, 11);
        let week = vec![
            detail(monday, AppointmentStatus::Pending, 45.0),
            detail(monday, AppointmentStatus::Cancelled, 80.0),
            detail(tuesday, AppointmentStatus::Confirmed, 35.0),
            detail(tuesday, AppointmentStatus::Completed, 70.0),
        ];

        let monday_stats = stats_for_day(&week, monday);
        assert_eq!(monday_stats.appointments, 1);
        assert_eq!(monday_stats.revenue, 45.0);

        let week_stats = stats_for_week(&week);
        assert_eq!(week_stats.appointments, 3);
        assert_eq!(week_stats.revenue, 150.0);
    }

    #[test]
    fn day_filter_keeps_cancelled_rows_visible() {
        let monday = day(2025, 3, 10);
        let week = vec![
            detail(monday, AppointmentStatus::Pending, 45.0),
            detail(monday, AppointmentStatus::Cancelled, 80.0),
            detail(day(2025, 3, 11), AppointmentStatus::Pending, 35.0),
        ];

        // The timeline still lists cancelled rows; only the stats skip them.
        assert_eq!(on_day(&week, monday).len(), 2);
    }
}
