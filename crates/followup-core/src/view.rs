use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Timelike,
  Weekday
};

use crate::timestamp::ScheduledEvent;

pub const MONTH_GRID_CELLS: usize = 42;
pub const MONTH_CELL_VISIBLE: usize = 3;
pub const WEEK_HOUR_START: u32 = 8;
pub const WEEK_HOUR_END: u32 = 19;
pub const WEEK_START: Weekday =
  Weekday::Sun;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum CalendarView {
  Month,
  Week,
  Day
}

impl CalendarView {
  pub fn as_key(self) -> &'static str {
    match self {
      | Self::Month => "month",
      | Self::Week => "week",
      | Self::Day => "day"
    }
  }

  pub fn from_key(
    key: &str
  ) -> Option<Self> {
    match key
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "month" => Some(Self::Month),
      | "week" => Some(Self::Week),
      | "day" => Some(Self::Day),
      | _ => None
    }
  }
}

impl FromStr for CalendarView {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    Self::from_key(s).ok_or_else(|| {
      anyhow!(
        "unknown calendar view: {s} \
         (expected month, week or \
         day)"
      )
    })
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Direction {
  Back,
  Forward
}

impl Direction {
  pub fn step(self) -> i32 {
    match self {
      | Self::Back => -1,
      | Self::Forward => 1
    }
  }
}

impl FromStr for Direction {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "back" | "prev" | "-1" => {
        Ok(Self::Back)
      }
      | "forward" | "next" | "+1"
      | "1" => Ok(Self::Forward),
      | other => {
        Err(anyhow!(
          "unknown direction: {other}"
        ))
      }
    }
  }
}

#[derive(Debug, Clone)]
pub struct DayCell<'a> {
  pub date:    NaiveDate,
  pub visible: Vec<ScheduledEvent<'a>>,
  pub hidden:  usize,
  pub total:   usize
}

impl DayCell<'_> {
  pub fn more_label(
    &self
  ) -> Option<String> {
    (self.hidden > 0).then(|| {
      format!("+{} more", self.hidden)
    })
  }
}

#[derive(Debug, Clone)]
pub enum MonthCell<'a> {
  Blank,
  Day(DayCell<'a>)
}

impl<'a> MonthCell<'a> {
  pub fn day(
    &self
  ) -> Option<&DayCell<'a>> {
    match self {
      | Self::Blank => None,
      | Self::Day(cell) => Some(cell)
    }
  }
}

#[derive(Debug, Clone)]
pub struct MonthGrid<'a> {
  pub first: NaiveDate,
  pub cells: Vec<MonthCell<'a>>
}

impl<'a> MonthGrid<'a> {
  pub fn rows(
    &self
  ) -> impl Iterator<Item = &[MonthCell<'a>]>
  {
    self.cells.chunks(7)
  }
}

#[derive(Debug, Clone)]
pub struct HourSlot<'a> {
  pub hour:   u32,
  pub events: Vec<ScheduledEvent<'a>>
}

#[derive(Debug, Clone)]
pub struct WeekColumn<'a> {
  pub date:  NaiveDate,
  pub slots: Vec<HourSlot<'a>>
}

#[derive(Debug, Clone)]
pub struct WeekGrid<'a> {
  pub start: NaiveDate,
  pub days:  Vec<WeekColumn<'a>>
}

#[derive(Debug, Clone)]
pub struct DayGrid<'a> {
  pub date:  NaiveDate,
  pub slots: Vec<HourSlot<'a>>
}

/// Always 42 cells, Sunday first, with
/// blanks outside the reference month.
#[tracing::instrument(
  skip(entries),
  fields(total = entries.len())
)]
pub fn month_grid<'a>(
  entries: &[ScheduledEvent<'a>],
  reference: NaiveDate
) -> MonthGrid<'a> {
  let first = first_day_of_month(
    reference.year(),
    reference.month()
  );
  let leading = first
    .weekday()
    .num_days_from_sunday()
    as usize;
  let month_days = days_in_month(
    reference.year(),
    reference.month()
  ) as usize;
  let mut by_day =
    bucket_by_day(entries);

  let cells = (0..MONTH_GRID_CELLS)
    .map(|idx| {
      if idx < leading
        || idx >= leading + month_days
      {
        return MonthCell::Blank;
      }
      let date = add_days(
        first,
        (idx - leading) as i64
      );
      let day_entries = by_day
        .remove(&date)
        .unwrap_or_default();
      let total = day_entries.len();
      let visible = day_entries
        .into_iter()
        .take(MONTH_CELL_VISIBLE)
        .collect::<Vec<_>>();
      MonthCell::Day(DayCell {
        date,
        hidden: total - visible.len(),
        visible,
        total
      })
    })
    .collect::<Vec<_>>();

  tracing::debug!(
    month = %first.format("%Y-%m"),
    leading,
    month_days,
    "month grid built"
  );
  MonthGrid { first, cells }
}

/// Sunday-anchored week, hours
/// 08:00 through 19:00.
#[tracing::instrument(
  skip(entries),
  fields(total = entries.len())
)]
pub fn week_grid<'a>(
  entries: &[ScheduledEvent<'a>],
  reference: NaiveDate
) -> WeekGrid<'a> {
  let start =
    start_of_week(reference, WEEK_START);
  let by_day = bucket_by_day(entries);

  let days = (0_i64..7_i64)
    .map(|offset| {
      let date = add_days(start, offset);
      WeekColumn {
        date,
        slots: hour_slots(
          by_day
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or_default(),
          WEEK_HOUR_START,
          WEEK_HOUR_END
        )
      }
    })
    .collect::<Vec<_>>();

  WeekGrid { start, days }
}

#[tracing::instrument(
  skip(entries),
  fields(total = entries.len())
)]
pub fn day_grid<'a>(
  entries: &[ScheduledEvent<'a>],
  reference: NaiveDate
) -> DayGrid<'a> {
  let day_entries = sorted_by_instant(
    entries
      .iter()
      .filter(|entry| {
        entry.local.date_naive()
          == reference
      })
      .cloned()
      .collect()
  );

  DayGrid {
    date:  reference,
    slots: hour_slots(
      &day_entries,
      0,
      23
    )
  }
}

/// Moves the reference date one view
/// period. Month steps clamp the day to
/// the target month's length.
pub fn navigate(
  current: NaiveDate,
  view: CalendarView,
  direction: Direction
) -> NaiveDate {
  let step = direction.step();
  match view {
    | CalendarView::Month => {
      shift_months(current, step)
    }
    | CalendarView::Week => {
      add_days(
        current,
        i64::from(step) * 7
      )
    }
    | CalendarView::Day => {
      add_days(current, i64::from(step))
    }
  }
}

pub fn title_for_view(
  view: CalendarView,
  focus: NaiveDate
) -> String {
  match view {
    | CalendarView::Month => {
      focus.format("%B %Y").to_string()
    }
    | CalendarView::Week => {
      let start =
        start_of_week(focus, WEEK_START);
      let end = add_days(start, 6);
      format!(
        "{} - {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
      )
    }
    | CalendarView::Day => {
      focus
        .format("%A, %Y-%m-%d")
        .to_string()
    }
  }
}

pub fn weekday_labels() -> [&'static str; 7]
{
  [
    "Sun", "Mon", "Tue", "Wed", "Thu",
    "Fri", "Sat"
  ]
}

fn bucket_by_day<'a>(
  entries: &[ScheduledEvent<'a>]
) -> BTreeMap<
  NaiveDate,
  Vec<ScheduledEvent<'a>>
> {
  let mut by_day: BTreeMap<
    NaiveDate,
    Vec<ScheduledEvent<'a>>
  > = BTreeMap::new();
  for entry in
    sorted_by_instant(entries.to_vec())
  {
    by_day
      .entry(entry.local.date_naive())
      .or_default()
      .push(entry);
  }
  by_day
}

fn hour_slots<'a>(
  day_entries: &[ScheduledEvent<'a>],
  hour_start: u32,
  hour_end: u32
) -> Vec<HourSlot<'a>> {
  (hour_start..=hour_end)
    .map(|hour| HourSlot {
      hour,
      events: day_entries
        .iter()
        .filter(|entry| {
          entry.local.hour() == hour
        })
        .cloned()
        .collect()
    })
    .collect()
}

fn sorted_by_instant<'a>(
  mut entries: Vec<ScheduledEvent<'a>>
) -> Vec<ScheduledEvent<'a>> {
  entries.sort_by_key(|entry| entry.at);
  entries
}

fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
  .day()
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}
