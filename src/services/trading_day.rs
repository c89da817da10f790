use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike, Weekday};

pub struct TradingCalendar;

impl TradingCalendar {
    /// 新建记录的默认日期：当天；周末回退到周五（不含节假日）
    pub fn default_record_date() -> String {
        Self::record_date_for(Local::now().naive_local().date())
    }

    pub fn record_date_for(day: NaiveDate) -> String {
        let back = match day.weekday() {
            Weekday::Sat => 1,
            Weekday::Sun => 2,
            _ => 0,
        };
        (day - Duration::days(back)).format("%Y-%m-%d").to_string()
    }

    /// 复盘提示用的盘面状态
    pub fn market_status() -> String {
        Self::market_status_at(Local::now().naive_local())
    }

    pub fn market_status_at(now: NaiveDateTime) -> String {
        let weekday = now.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            return "休市(周末)".to_string();
        }
        let time_val = now.hour() * 100 + now.minute();

        if time_val < 915 {
            "盘前".to_string()
        } else if time_val <= 925 {
            "竞价中".to_string()
        } else if time_val < 930 {
            "集合竞价结束".to_string()
        } else if time_val <= 1130 {
            "交易中(上午)".to_string()
        } else if time_val < 1300 {
            "午间休市".to_string()
        } else if time_val <= 1500 {
            "交易中(下午)".to_string()
        } else {
            "已收盘".to_string()
        }
    }
}
