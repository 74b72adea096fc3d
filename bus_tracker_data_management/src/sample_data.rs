use std::sync::Arc;

use bus_tracker_lib::{
    TrackerError,
    route::{Route, Stop},
};
use chrono::NaiveTime;

use crate::fleet::{Bus, BusStatus, Driver, DriverStatus, Parent, ParentStatus, Student};

pub const SCHOOL: &str = "St. Aloysius School";

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

pub(crate) fn routes() -> Result<Vec<Arc<Route>>, TrackerError> {
    let falnir = Route::new(
        "RT-FALNIR",
        "Falnir - Kankanady Morning Pickup",
        vec![
            Stop::new("s1", "Falnir Road", at(7, 30), 12.8698, 74.8430),
            Stop::new("s2", "Hampankatta Circle", at(7, 36), 12.8700, 74.8422).with_students_count(1),
            Stop::new("s3", "Kankanady Market", at(7, 42), 12.8725, 74.8562).with_students_count(2),
            Stop::new("s4", "Bejai Main Road", at(7, 51), 12.8855, 74.8390).with_students_count(1),
            Stop::new("s5", SCHOOL, at(8, 5), 12.8741, 74.8460),
        ],
    )?;

    let kadri = Route::new(
        "RT-KADRI",
        "Kadri - Lighthouse Hill Morning Pickup",
        vec![
            Stop::new("k1", "Kadri Park", at(7, 25), 12.8872, 74.8556).with_students_count(1),
            Stop::new("k2", "Nanthoor Junction", at(7, 38), 12.8830, 74.8650),
            Stop::new("k3", "Lighthouse Hill Road", at(7, 52), 12.8722, 74.8440),
            Stop::new("k4", SCHOOL, at(8, 2), 12.8741, 74.8460),
        ],
    )?;

    Ok(vec![Arc::new(falnir), Arc::new(kadri)])
}

fn student(id: &str, name: &str, grade: &str, route_id: &str, stop_id: &str, parent_id: &str) -> Student {
    Student {
        student_id: id.into(),
        name: name.into(),
        grade: grade.into(),
        school: SCHOOL.into(),
        route_id: route_id.into(),
        stop_id: stop_id.into(),
        avatar_url: format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", name.split(' ').next().unwrap_or(name)),
        parent_id: Some(parent_id.into()),
    }
}

pub(crate) fn students() -> Vec<Student> {
    vec![
        student("c1", "Aarav Kumar", "Grade 5", "RT-FALNIR", "s3", "p1"),
        student("c2", "Diya Kumar", "Grade 2", "RT-FALNIR", "s3", "p1"),
        student("c3", "Ishaan Rao", "Grade 7", "RT-FALNIR", "s2", "p2"),
        student("c4", "Meera Pai", "Grade 4", "RT-FALNIR", "s4", "p3"),
        student("c5", "Rohan D'Souza", "Grade 6", "RT-KADRI", "k1", "p3"),
    ]
}

pub(crate) fn parents() -> Vec<Parent> {
    vec![
        Parent {
            parent_id: "p1".into(),
            name: "Ravi Kumar".into(),
            email: "ravi.kumar@example.com".into(),
            phone: "+91 98450 11223".into(),
            children_ids: vec!["c1".into(), "c2".into()],
            status: ParentStatus::Approved,
        },
        Parent {
            parent_id: "p2".into(),
            name: "Sunita Rao".into(),
            email: "sunita.rao@example.com".into(),
            phone: "+91 99001 44556".into(),
            children_ids: vec!["c3".into()],
            status: ParentStatus::Approved,
        },
        Parent {
            parent_id: "p3".into(),
            name: "Anil Pai".into(),
            email: "anil.pai@example.com".into(),
            phone: "+91 97412 77889".into(),
            children_ids: vec!["c4".into(), "c5".into()],
            status: ParentStatus::Pending,
        },
    ]
}

pub(crate) fn drivers() -> Vec<Driver> {
    vec![
        Driver {
            driver_id: "d1".into(),
            name: "Manjunath Shetty".into(),
            phone: "+91 98860 12345".into(),
            license_number: "KA19 20110004567".into(),
            assigned_bus_id: Some("b1".into()),
            status: DriverStatus::Active,
            photo_url: "https://api.dicebear.com/7.x/avataaars/svg?seed=Manju".into(),
        },
        Driver {
            driver_id: "d2".into(),
            name: "Prakash Naik".into(),
            phone: "+91 94480 67890".into(),
            license_number: "KA19 20150007788".into(),
            assigned_bus_id: Some("b2".into()),
            status: DriverStatus::Active,
            photo_url: "https://api.dicebear.com/7.x/avataaars/svg?seed=Prakash".into(),
        },
    ]
}

pub(crate) fn buses() -> Vec<Bus> {
    vec![
        Bus {
            bus_id: "b1".into(),
            registration_number: "KA-19-AB-1234".into(),
            capacity: 40,
            route_id: "RT-FALNIR".into(),
            driver_id: Some("d1".into()),
            status: BusStatus::Active,
        },
        Bus {
            bus_id: "b2".into(),
            registration_number: "KA-19-CD-5678".into(),
            capacity: 30,
            route_id: "RT-KADRI".into(),
            driver_id: Some("d2".into()),
            status: BusStatus::Active,
        },
        Bus {
            bus_id: "b3".into(),
            registration_number: "KA-19-EF-9012".into(),
            capacity: 30,
            route_id: "RT-FALNIR".into(),
            driver_id: None,
            status: BusStatus::Maintenance,
        },
    ]
}
