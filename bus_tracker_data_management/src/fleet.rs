use bus_tracker_lib::{attendance::ScheduledStudent, route::RouteId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{DataManagerError, store::Record};

pub const DEFAULT_BUS_CAPACITY: u32 = 30;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Driver {
    #[serde(default)]
    pub driver_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub license_number: String,
    #[serde(default)]
    pub assigned_bus_id: Option<String>,
    #[serde(default)]
    pub status: DriverStatus,
    #[serde(default)]
    pub photo_url: String,
}

impl Record for Driver {
    const PREFIX: &'static str = "d";
    const KIND: &'static str = "driver";

    fn id(&self) -> &str {
        &self.driver_id
    }

    fn set_id(&mut self, id: String) {
        self.driver_id = id;
    }

    fn validate(&mut self) -> Result<(), DataManagerError> {
        if self.name.trim().is_empty() {
            return Err(DataManagerError::Invalid("driver name is required".into()));
        }
        if self.photo_url.is_empty() {
            self.photo_url = format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", self.name.replace(' ', ""));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParentStatus {
    Approved,
    #[default]
    Pending,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parent {
    #[serde(default)]
    pub parent_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub children_ids: Vec<String>,
    #[serde(default)]
    pub status: ParentStatus,
}

impl Record for Parent {
    const PREFIX: &'static str = "p";
    const KIND: &'static str = "parent";

    fn id(&self) -> &str {
        &self.parent_id
    }

    fn set_id(&mut self, id: String) {
        self.parent_id = id;
    }

    fn validate(&mut self) -> Result<(), DataManagerError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(DataManagerError::Invalid("parent name and email are required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    #[default]
    Active,
    Maintenance,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Bus {
    #[serde(default)]
    pub bus_id: String,
    /// e.g. KA-19-AB-1234
    pub registration_number: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub route_id: RouteId,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub status: BusStatus,
}

impl Record for Bus {
    const PREFIX: &'static str = "b";
    const KIND: &'static str = "bus";

    fn id(&self) -> &str {
        &self.bus_id
    }

    fn set_id(&mut self, id: String) {
        self.bus_id = id;
    }

    fn validate(&mut self) -> Result<(), DataManagerError> {
        if self.registration_number.trim().is_empty() {
            return Err(DataManagerError::Invalid("bus registration number is required".into()));
        }
        if self.capacity == 0 {
            self.capacity = DEFAULT_BUS_CAPACITY;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Student {
    #[serde(default)]
    pub student_id: String,
    pub name: String,
    pub grade: String,
    pub school: String,
    pub route_id: RouteId,
    pub stop_id: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Student {
    pub fn scheduled(&self) -> ScheduledStudent {
        ScheduledStudent {
            student_id: self.student_id.clone(),
            name: self.name.clone(),
            grade: self.grade.clone(),
            stop_id: self.stop_id.clone(),
        }
    }
}

impl Record for Student {
    const PREFIX: &'static str = "c";
    const KIND: &'static str = "student";

    fn id(&self) -> &str {
        &self.student_id
    }

    fn set_id(&mut self, id: String) {
        self.student_id = id;
    }

    fn validate(&mut self) -> Result<(), DataManagerError> {
        if self.name.trim().is_empty() || self.stop_id.is_empty() {
            return Err(DataManagerError::Invalid("student name and stop are required".into()));
        }
        Ok(())
    }
}

/// A parent's notice that their child will not board on `date`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaveRequest {
    #[serde(default)]
    pub leave_id: String,
    pub student_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Record for LeaveRequest {
    const PREFIX: &'static str = "l";
    const KIND: &'static str = "leave request";

    fn id(&self) -> &str {
        &self.leave_id
    }

    fn set_id(&mut self, id: String) {
        self.leave_id = id;
    }

    fn validate(&mut self) -> Result<(), DataManagerError> {
        if self.student_id.is_empty() {
            return Err(DataManagerError::Invalid("leave request needs a student".into()));
        }
        // A blank reason is the same as none.
        if self.reason.as_deref().is_some_and(|reason| reason.trim().is_empty()) {
            self.reason = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_leave_reason_is_dropped() {
        let mut leave: LeaveRequest = serde_json::from_str(r#"{"student_id": "c1", "date": "2026-10-19", "reason": "  "}"#).unwrap();
        leave.validate().unwrap();
        assert_eq!(leave.reason, None);
        assert_eq!(leave.date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }

    #[test]
    fn bus_gets_default_capacity() {
        let mut bus: Bus = serde_json::from_str(r#"{"registration_number": "KA-19-AB-9999"}"#).unwrap();
        bus.validate().unwrap();
        assert_eq!(bus.capacity, DEFAULT_BUS_CAPACITY);
        assert_eq!(bus.status, BusStatus::Active);
    }

    #[test]
    fn bus_needs_registration() {
        let mut bus: Bus = serde_json::from_str(r#"{"registration_number": " ", "capacity": 40}"#).unwrap();
        assert!(matches!(bus.validate(), Err(DataManagerError::Invalid(_))));
    }

    #[test]
    fn new_parents_are_pending() {
        let mut parent: Parent = serde_json::from_str(r#"{"name": "Ravi Kumar", "email": "ravi@example.com"}"#).unwrap();
        parent.validate().unwrap();
        assert_eq!(parent.status, ParentStatus::Pending);
        assert!(parent.children_ids.is_empty());
    }

    #[test]
    fn parents_need_name_and_email() {
        let mut parent: Parent = serde_json::from_str(r#"{"name": "Ravi Kumar", "email": ""}"#).unwrap();
        assert!(parent.validate().is_err());
    }

    #[test]
    fn driver_gets_an_avatar() {
        let mut driver: Driver = serde_json::from_str(r#"{"name": "Manjunath Shetty"}"#).unwrap();
        driver.validate().unwrap();
        assert!(driver.photo_url.ends_with("seed=ManjunathShetty"));
        assert_eq!(driver.status, DriverStatus::Active);
    }
}
