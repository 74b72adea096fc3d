use std::sync::Arc;

use bus_tracker_lib::{attendance::ScheduledStudent, route::Route};
use chrono::NaiveDate;

use crate::{
    DataManagerError,
    fleet::{Bus, BusStatus, Driver, LeaveRequest, Parent, ParentStatus, Student},
    sample_data,
    store::Store,
};

#[derive(Clone)]
pub struct DataManager {
    drivers: Store<Driver>,
    parents: Store<Parent>,
    buses: Store<Bus>,
    students: Store<Student>,
    leaves: Store<LeaveRequest>,
    routes: Arc<Vec<Arc<Route>>>,
}

/// The public interface for all fleet and route data.
impl DataManager {
    /// Starts with the built-in Mangalore routes and fleet.
    pub async fn start() -> Result<Self, DataManagerError> {
        let routes = sample_data::routes()?;
        tracing::debug!("Loaded {} routes", routes.len());

        Ok(DataManager {
            drivers: Store::new(sample_data::drivers()),
            parents: Store::new(sample_data::parents()),
            buses: Store::new(sample_data::buses()),
            students: Store::new(sample_data::students()),
            leaves: Store::new(Vec::new()),
            routes: Arc::new(routes),
        })
    }

    pub fn drivers(&self) -> &Store<Driver> {
        &self.drivers
    }

    pub fn parents(&self) -> &Store<Parent> {
        &self.parents
    }

    pub fn buses(&self) -> &Store<Bus> {
        &self.buses
    }

    pub fn students(&self) -> &Store<Student> {
        &self.students
    }

    pub fn leaves(&self) -> &Store<LeaveRequest> {
        &self.leaves
    }

    /// Records that a student will not board on `date`. One request per student and day.
    pub async fn apply_leave(&self, student_id: &str, date: NaiveDate, reason: Option<String>) -> Result<LeaveRequest, DataManagerError> {
        self.students.get(student_id).await?;
        if self
            .leaves
            .list()
            .await
            .iter()
            .any(|leave| leave.student_id == student_id && leave.date == date)
        {
            return Err(DataManagerError::Invalid(format!("student {student_id} already has leave on {date}")));
        }

        let leave = self
            .leaves
            .insert(LeaveRequest {
                leave_id: String::new(),
                student_id: student_id.to_string(),
                date,
                reason,
            })
            .await?;
        tracing::info!("Leave {} for student {} on {}", leave.leave_id, student_id, date);
        Ok(leave)
    }

    /// Leave requests on `date` for students riding the route.
    pub async fn leaves_on(&self, route_id: &str, date: NaiveDate) -> Result<Vec<LeaveRequest>, DataManagerError> {
        let riders: Vec<_> = self
            .roster_for_route(route_id)
            .await?
            .into_iter()
            .map(|student| student.student_id)
            .collect();
        Ok(self
            .leaves
            .list()
            .await
            .into_iter()
            .filter(|leave| leave.date == date && riders.contains(&leave.student_id))
            .collect())
    }

    pub async fn set_parent_status(&self, parent_id: &str, status: ParentStatus) -> Result<Parent, DataManagerError> {
        let parent = self.parents.modify(parent_id, |parent| parent.status = status).await?;
        tracing::info!("Parent {} is now {:?}", parent_id, status);
        Ok(parent)
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.iter().cloned().collect()
    }

    pub fn route(&self, route_id: &str) -> Result<Arc<Route>, DataManagerError> {
        self.routes
            .iter()
            .find(|route| route.route_id() == route_id)
            .cloned()
            .ok_or_else(|| DataManagerError::NotFound(format!("route {route_id}")))
    }

    /// Students scheduled on the route, in stored order.
    pub async fn roster_for_route(&self, route_id: &str) -> Result<Vec<ScheduledStudent>, DataManagerError> {
        self.route(route_id)?;
        Ok(self
            .students
            .list()
            .await
            .iter()
            .filter(|student| student.route_id == route_id)
            .map(Student::scheduled)
            .collect())
    }

    /// Route and roster a bus needs to start a trip.
    pub async fn trip_plan(&self, bus_id: &str) -> Result<(Arc<Route>, Vec<ScheduledStudent>), DataManagerError> {
        let bus = self.buses.get(bus_id).await?;
        if bus.status == BusStatus::Maintenance {
            return Err(DataManagerError::Invalid(format!("bus {bus_id} is in maintenance")));
        }

        let route = self.route(&bus.route_id)?;
        let roster = self.roster_for_route(&bus.route_id).await?;
        Ok((route, roster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_with_sample_fleet() {
        let data = DataManager::start().await.unwrap();
        assert_eq!(data.routes().len(), 2);
        assert_eq!(data.buses().len().await, 3);
        assert_eq!(data.route("RT-FALNIR").unwrap().len(), 5);
    }

    #[tokio::test]
    async fn stop_counts_match_students() {
        let data = DataManager::start().await.unwrap();
        for route in data.routes() {
            let roster = data.roster_for_route(route.route_id()).await.unwrap();
            for stop in route.stops() {
                let boarding = roster.iter().filter(|s| s.stop_id == stop.stop_id).count() as u32;
                assert_eq!(stop.students_count.unwrap_or(0), boarding, "{}", stop.stop_id);
            }
        }
    }

    #[tokio::test]
    async fn trip_plan_for_bus() {
        let data = DataManager::start().await.unwrap();
        let (route, roster) = data.trip_plan("b1").await.unwrap();
        assert_eq!(route.route_id(), "RT-FALNIR");
        assert_eq!(roster.len(), 4);

        assert!(matches!(data.trip_plan("b3").await, Err(DataManagerError::Invalid(_))));
        assert!(matches!(data.trip_plan("b99").await, Err(DataManagerError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let data = DataManager::start().await.unwrap();
        assert_eq!(data.route("RT-NOWHERE").unwrap_err(), DataManagerError::NotFound("route RT-NOWHERE".into()));
        assert!(data.roster_for_route("RT-NOWHERE").await.is_err());
    }

    #[tokio::test]
    async fn approve_pending_parent() {
        let data = DataManager::start().await.unwrap();
        let parent = data.set_parent_status("p3", ParentStatus::Approved).await.unwrap();
        assert_eq!(parent.status, ParentStatus::Approved);
        assert_eq!(data.parents().get("p3").await.unwrap().status, ParentStatus::Approved);
    }

    #[tokio::test]
    async fn leave_once_per_day() {
        let data = DataManager::start().await.unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let tomorrow = today.succ_opt().unwrap();

        let leave = data.apply_leave("c1", today, Some("Fever".into())).await.unwrap();
        assert_eq!(leave.leave_id, "l1");
        assert!(matches!(data.apply_leave("c1", today, None).await, Err(DataManagerError::Invalid(_))));
        data.apply_leave("c1", tomorrow, None).await.unwrap();
        assert!(matches!(data.apply_leave("c99", today, None).await, Err(DataManagerError::NotFound(_))));
        // c5 rides RT-KADRI.
        data.apply_leave("c5", today, None).await.unwrap();

        let falnir: Vec<_> = data.leaves_on("RT-FALNIR", today).await.unwrap().into_iter().map(|l| l.student_id).collect();
        assert_eq!(falnir, ["c1"]);
        assert_eq!(data.leaves_on("RT-KADRI", today).await.unwrap().len(), 1);
        assert_eq!(data.leaves().len().await, 3);
    }

    #[tokio::test]
    async fn new_bus_gets_next_id() {
        let data = DataManager::start().await.unwrap();
        let bus = Bus {
            bus_id: String::new(),
            registration_number: "KA-19-GH-3456".into(),
            capacity: 0,
            route_id: "RT-KADRI".into(),
            driver_id: None,
            status: BusStatus::Active,
        };
        let added = data.buses().insert(bus).await.unwrap();
        assert_eq!(added.bus_id, "b4");
        assert_eq!(added.capacity, 30);
    }
}
