use crate::api::ForecastDataset;
use crate::coordinator::Snapshot;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// One point of the forecast curve, ascending by time, datetime rendered in
/// the coordinator's timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub datetime: String,
    pub energy_kwh: f64,
}

/// Everything the read surface presents, recomputed from the snapshot on
/// every call. Sums are rounded to 2 decimals at this boundary only.
#[derive(Debug, Serialize)]
pub struct SensorReadings {
    pub today_total_kwh: f64,
    pub tomorrow_total_kwh: f64,
    pub rest_of_day_kwh: f64,
    pub current_hour_power_w: i64,
    pub next_hour_power_w: i64,
    pub forecast_so_far_kwh: f64,
    pub forecast: Vec<ForecastPoint>,
    pub api_calls_today: u64,
    pub api_status: &'static str,
    pub api_message: String,
    pub next_api_request_at: Option<String>,
    pub last_api_success_at: Option<String>,
}

pub fn readings(snapshot: &Snapshot, now: DateTime<Tz>) -> SensorReadings {
    SensorReadings {
        today_total_kwh: today_total(&snapshot.dataset, now),
        tomorrow_total_kwh: tomorrow_total(&snapshot.dataset, now),
        rest_of_day_kwh: rest_of_day(&snapshot.dataset, now),
        current_hour_power_w: hour_power_w(&snapshot.dataset, now, 0),
        next_hour_power_w: hour_power_w(&snapshot.dataset, now, 1),
        forecast_so_far_kwh: forecast_so_far(&snapshot.dataset, now),
        forecast: forecast_curve(&snapshot.dataset, &now.timezone()),
        api_calls_today: snapshot.api_calls_today,
        api_status: status_label(snapshot.api_status),
        api_message: snapshot.api_message.clone(),
        next_api_request_at: snapshot.next_api_request_at.map(|dt| dt.to_rfc3339()),
        last_api_success_at: snapshot.last_api_success_at.map(|dt| dt.to_rfc3339()),
    }
}

pub fn status_label(api_status: Option<i64>) -> &'static str {
    match api_status {
        Some(0) => "OK",
        _ => "Error",
    }
}

/// Sum of all buckets falling on today's local date.
pub fn today_total(dataset: &ForecastDataset, now: DateTime<Tz>) -> f64 {
    let tz = now.timezone();
    let today = now.date_naive();
    round2(
        dataset
            .iter()
            .filter_map(|(ts, kwh)| {
                (bucket_local(&tz, *ts)?.date_naive() == today).then_some(*kwh)
            })
            .sum(),
    )
}

/// Sum of all buckets falling on tomorrow's local date.
pub fn tomorrow_total(dataset: &ForecastDataset, now: DateTime<Tz>) -> f64 {
    let tz = now.timezone();
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return 0.0;
    };
    round2(
        dataset
            .iter()
            .filter_map(|(ts, kwh)| {
                (bucket_local(&tz, *ts)?.date_naive() == tomorrow).then_some(*kwh)
            })
            .sum(),
    )
}

/// Remaining production today: buckets on today's local date starting at or
/// after `now`. A bucket exactly at `now` is included.
pub fn rest_of_day(dataset: &ForecastDataset, now: DateTime<Tz>) -> f64 {
    let tz = now.timezone();
    let today = now.date_naive();
    round2(
        dataset
            .iter()
            .filter_map(|(ts, kwh)| {
                let local = bucket_local(&tz, *ts)?;
                (local.date_naive() == today && local >= now).then_some(*kwh)
            })
            .sum(),
    )
}

/// Energy-dashboard aggregate: today's production from local midnight
/// through `now`, inclusive.
pub fn forecast_so_far(dataset: &ForecastDataset, now: DateTime<Tz>) -> f64 {
    let tz = now.timezone();
    let today = now.date_naive();
    round2(
        dataset
            .iter()
            .filter_map(|(ts, kwh)| {
                let local = bucket_local(&tz, *ts)?;
                (local.date_naive() == today && local <= now).then_some(*kwh)
            })
            .sum(),
    )
}

/// Power in watts for the bucket `hours_ahead` hours from the current local
/// hour; 0 when no such bucket exists. kWh over one hour maps 1:1000 to W.
pub fn hour_power_w(dataset: &ForecastDataset, now: DateTime<Tz>, hours_ahead: i64) -> i64 {
    let Some(bucket) = hour_bucket_epoch(now + Duration::hours(hours_ahead)) else {
        return 0;
    };
    dataset
        .get(&bucket)
        .map(|kwh| (kwh * 1000.0) as i64)
        .unwrap_or(0)
}

/// The full curve, ascending by timestamp. Present (possibly empty) even
/// when no poll has succeeded yet.
pub fn forecast_curve(dataset: &ForecastDataset, tz: &Tz) -> Vec<ForecastPoint> {
    dataset
        .iter()
        .filter_map(|(ts, kwh)| {
            Some(ForecastPoint {
                datetime: bucket_local(tz, *ts)?.to_rfc3339(),
                energy_kwh: *kwh,
            })
        })
        .collect()
}

fn bucket_local(tz: &Tz, epoch: i64) -> Option<DateTime<Tz>> {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|utc| utc.with_timezone(tz))
}

fn hour_bucket_epoch(at: DateTime<Tz>) -> Option<i64> {
    let truncated = at.with_minute(0)?.with_second(0)?.with_nanosecond(0)?;
    Some(truncated.timestamp())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const BERLIN: Tz = chrono_tz::Europe::Berlin;

    fn berlin(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        BERLIN
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .expect("local datetime")
    }

    fn epoch(y: i32, mo: u32, d: u32, h: u32) -> i64 {
        berlin(y, mo, d, h, 0).timestamp()
    }

    /// 2024-06-10 in Berlin: 1.0 kWh at 10:00, 2.0 at 12:00, 0.5 at 13:00,
    /// plus 3.0 the next day at 11:00.
    fn sample_dataset() -> ForecastDataset {
        ForecastDataset::from([
            (epoch(2024, 6, 10, 10), 1.0),
            (epoch(2024, 6, 10, 12), 2.0),
            (epoch(2024, 6, 10, 13), 0.5),
            (epoch(2024, 6, 11, 11), 3.0),
        ])
    }

    #[test]
    fn today_and_tomorrow_totals_split_on_local_date() {
        let dataset = sample_dataset();
        let now = berlin(2024, 6, 10, 12, 30);
        assert_eq!(today_total(&dataset, now), 3.5);
        assert_eq!(tomorrow_total(&dataset, now), 3.0);
    }

    #[test]
    fn totals_round_to_two_decimals_at_the_boundary() {
        let dataset = ForecastDataset::from([
            (epoch(2024, 6, 10, 10), 1.111),
            (epoch(2024, 6, 10, 11), 2.222),
        ]);
        let now = berlin(2024, 6, 10, 12, 0);
        assert_eq!(today_total(&dataset, now), 3.33);
    }

    #[test]
    fn empty_dataset_sums_to_zero() {
        let dataset = ForecastDataset::new();
        let now = berlin(2024, 6, 10, 12, 30);
        assert_eq!(today_total(&dataset, now), 0.0);
        assert_eq!(tomorrow_total(&dataset, now), 0.0);
        assert_eq!(rest_of_day(&dataset, now), 0.0);
        assert_eq!(forecast_so_far(&dataset, now), 0.0);
    }

    #[test]
    fn rest_of_day_keeps_only_buckets_from_now_on() {
        let dataset = sample_dataset();
        assert_eq!(rest_of_day(&dataset, berlin(2024, 6, 10, 12, 30)), 0.5);
        // A bucket exactly at `now` is included.
        assert_eq!(rest_of_day(&dataset, berlin(2024, 6, 10, 12, 0)), 2.5);
        // Tomorrow's bucket never counts toward the rest of today.
        assert_eq!(rest_of_day(&dataset, berlin(2024, 6, 10, 23, 30)), 0.0);
    }

    #[test]
    fn forecast_so_far_runs_from_midnight_through_now() {
        let dataset = sample_dataset();
        assert_eq!(forecast_so_far(&dataset, berlin(2024, 6, 10, 12, 30)), 3.0);
        assert_eq!(forecast_so_far(&dataset, berlin(2024, 6, 10, 12, 0)), 3.0);
        assert_eq!(forecast_so_far(&dataset, berlin(2024, 6, 10, 9, 0)), 0.0);
    }

    #[test]
    fn hour_power_converts_kwh_buckets_to_watts() {
        let dataset = sample_dataset();
        let now = berlin(2024, 6, 10, 12, 30);
        assert_eq!(hour_power_w(&dataset, now, 0), 2000);
        assert_eq!(hour_power_w(&dataset, now, 1), 500);
        // 14:00 has no bucket.
        assert_eq!(hour_power_w(&dataset, berlin(2024, 6, 10, 14, 10), 0), 0);
    }

    #[test]
    fn forecast_curve_is_ascending_and_localized() {
        let curve = forecast_curve(&sample_dataset(), &BERLIN);
        assert_eq!(curve.len(), 4);
        assert_eq!(curve[0].energy_kwh, 1.0);
        assert_eq!(curve[0].datetime, "2024-06-10T10:00:00+02:00");
        assert_eq!(curve[3].datetime, "2024-06-11T11:00:00+02:00");
        let mut sorted = curve.clone();
        sorted.sort_by(|a, b| a.datetime.cmp(&b.datetime));
        assert_eq!(curve, sorted);
    }

    #[test]
    fn status_label_is_ok_only_for_status_zero() {
        assert_eq!(status_label(Some(0)), "OK");
        assert_eq!(status_label(Some(-1)), "Error");
        assert_eq!(status_label(Some(3)), "Error");
        assert_eq!(status_label(None), "Error");
    }

    #[test]
    fn readings_compose_all_sensors_from_one_snapshot() {
        let snapshot = Snapshot {
            dataset: Arc::new(sample_dataset()),
            api_status: Some(0),
            api_message: "OK".to_string(),
            next_api_request_at: Some(berlin(2024, 6, 10, 15, 0)),
            last_api_success_at: Some(berlin(2024, 6, 10, 12, 0)),
            api_calls_today: 4,
            last_reset_day: berlin(2024, 6, 10, 0, 0).date_naive(),
        };
        let all = readings(&snapshot, berlin(2024, 6, 10, 12, 30));
        assert_eq!(all.today_total_kwh, 3.5);
        assert_eq!(all.tomorrow_total_kwh, 3.0);
        assert_eq!(all.rest_of_day_kwh, 0.5);
        assert_eq!(all.current_hour_power_w, 2000);
        assert_eq!(all.next_hour_power_w, 500);
        assert_eq!(all.forecast_so_far_kwh, 3.0);
        assert_eq!(all.forecast.len(), 4);
        assert_eq!(all.api_status, "OK");
        assert_eq!(all.api_calls_today, 4);
        assert_eq!(
            all.next_api_request_at.as_deref(),
            Some("2024-06-10T15:00:00+02:00")
        );
    }

    #[test]
    fn empty_snapshot_still_reports_every_field() {
        let snapshot = Snapshot {
            dataset: Arc::new(ForecastDataset::new()),
            api_status: None,
            api_message: String::new(),
            next_api_request_at: None,
            last_api_success_at: None,
            api_calls_today: 0,
            last_reset_day: berlin(2024, 6, 10, 0, 0).date_naive(),
        };
        let all = readings(&snapshot, berlin(2024, 6, 10, 12, 30));
        assert_eq!(all.today_total_kwh, 0.0);
        assert_eq!(all.current_hour_power_w, 0);
        assert!(all.forecast.is_empty());
        assert_eq!(all.api_status, "Error");
        assert!(all.next_api_request_at.is_none());
    }
}
