// src/dashboard_data.rs

use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use log::debug;
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::Claims;
use crate::error::ApiResult;
use crate::models::{
    issue::{Issue, Priority, Status},
    now, Role,
};

const RECENT_ISSUES: usize = 5;

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub users: u64,
    pub departments: u64,
    pub teams: u64,
    pub issues: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub totals: Totals,
    pub issues_by_status: BTreeMap<String, u64>,
    pub issues_by_priority: BTreeMap<String, u64>,
    pub issues_by_department: BTreeMap<String, u64>,
    pub sla_breached: u64,
    pub recent_issues: Vec<Issue>,
}

/// Folds the issue list into dashboard counters. Status and priority keys
/// are always present, even at zero.
pub fn summarize(mut issues: Vec<Issue>, mut totals: Totals, at: DateTime<Utc>) -> Dashboard {
    totals.issues = issues.len() as u64;

    // 1) Zero-filled buckets
    let mut issues_by_status: BTreeMap<String, u64> =
        Status::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    let mut issues_by_priority: BTreeMap<String, u64> =
        Priority::ALL.iter().map(|p| (p.as_str().to_string(), 0)).collect();
    let mut issues_by_department = BTreeMap::new();
    let mut sla_breached = 0;

    // 2) One pass over the issues
    for issue in &issues {
        *issues_by_status.entry(issue.status.as_str().to_string()).or_default() += 1;
        *issues_by_priority.entry(issue.priority.as_str().to_string()).or_default() += 1;
        for department in &issue.departments {
            *issues_by_department.entry(department.clone()).or_default() += 1;
        }
        if issue.sla_breached(at) {
            sla_breached += 1;
        }
    }

    // 3) Newest first
    issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    issues.truncate(RECENT_ISSUES);

    Dashboard {
        totals,
        issues_by_status,
        issues_by_priority,
        issues_by_department,
        sla_breached,
        recent_issues: issues,
    }
}

// GET /api/dashboard
// Department accounts only see issues routed to their department.
pub async fn get_dashboard(data: web::Data<AppState>, claims: Claims) -> ApiResult<HttpResponse> {
    let filter = if claims.role == Role::Department {
        let department = claims.department.clone().unwrap_or_else(|| claims.name.clone());
        doc! { "departments": department }
    } else {
        doc! {}
    };

    let issues = data.issues.find_many(filter).await?;
    let totals = Totals {
        users: data.users.count(doc! {}).await?,
        departments: data.departments.count(doc! {}).await?,
        teams: data.teams.count(doc! {}).await?,
        issues: 0,
    };

    let dashboard = summarize(issues, totals, now());
    debug!(
        "Dashboard for {}: {} issues, {} past SLA",
        claims.email, dashboard.totals.issues, dashboard.sla_breached
    );
    Ok(HttpResponse::Ok().json(dashboard))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::StatusCode,
        test::{call_service, init_service, read_body_json, TestRequest},
    };
    use chrono::Duration;

    use super::*;
    use crate::auth::create_jwt;
    use crate::models::{department::Department, issue::ReportIssueRequest, new_id};
    use crate::test_support::{bearer, seed_user, test_app, test_state, SECRET};

    fn issue(department: &str, priority: Priority, sla: f64, age_hours: i64) -> Issue {
        let mut issue = Issue::report(
            ReportIssueRequest {
                title: "Stoppage".into(),
                description: "Line stopped".into(),
                priority,
                departments: vec![department.into()],
                machine_id: "M-1".into(),
                sla,
            },
            "reporter",
        )
        .unwrap();
        issue.created_at = now() - Duration::hours(age_hours);
        issue
    }

    #[test]
    fn summary_counts_and_zero_fills() {
        let mut resolved = issue("Quality", Priority::Low, 1.0, 10);
        resolved.status = Status::Resolved;
        let issues = vec![
            issue("Maintenance", Priority::High, 1.0, 3),
            issue("Maintenance", Priority::High, 8.0, 3),
            issue("Maintenance", Priority::Medium, 0.0, 30),
            resolved,
        ];

        let dashboard = summarize(issues, Totals::default(), now());
        assert_eq!(dashboard.totals.issues, 4);
        assert_eq!(dashboard.issues_by_status["Open"], 3);
        assert_eq!(dashboard.issues_by_status["Resolved"], 1);
        assert_eq!(dashboard.issues_by_status["Completed"], 0);
        assert_eq!(dashboard.issues_by_status.len(), Status::ALL.len());
        assert_eq!(dashboard.issues_by_priority["High"], 2);
        assert_eq!(dashboard.issues_by_priority["Low"], 1);
        assert_eq!(dashboard.issues_by_department["Maintenance"], 3);
        // Only the open 1h-SLA issue is late; zero SLA and resolved issues never are.
        assert_eq!(dashboard.sla_breached, 1);
        let recent = &dashboard.recent_issues;
        assert!(recent.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn recent_issues_are_capped() {
        let issues = (0..8).map(|h| issue("Quality", Priority::Low, 0.0, h)).collect();
        let dashboard = summarize(issues, Totals::default(), now());
        assert_eq!(dashboard.recent_issues.len(), RECENT_ISSUES);
    }

    #[actix_web::test]
    async fn oversized_sla_never_breaks_the_dashboard() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@plant.example", Role::Admin).await;
        let mut stored = issue("Maintenance", Priority::High, 1.0, 1);
        stored.sla = 1e12;
        state.issues.insert(&stored).await.unwrap();
        let app = init_service(test_app(state)).await;

        let req = TestRequest::post()
            .uri("/api/issues")
            .insert_header(bearer(&admin))
            .set_json(serde_json::json!({
                "title": "Stoppage",
                "description": "Line stopped",
                "sla": 1e12
            }))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(bearer(&admin))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let dashboard: Dashboard = read_body_json(resp).await;
        assert_eq!(dashboard.totals.issues, 1);
        assert_eq!(dashboard.sla_breached, 0);
    }

    #[actix_web::test]
    async fn department_sees_only_its_issues() {
        let state = test_state();
        let (_, admin) = seed_user(&state, "admin@plant.example", Role::Admin).await;
        state.issues.insert(&issue("Maintenance", Priority::High, 1.0, 1)).await.unwrap();
        state.issues.insert(&issue("Quality", Priority::Low, 1.0, 1)).await.unwrap();

        let created_at = now();
        let department = Department {
            id: new_id(),
            name: "Quality".into(),
            manager: "Riya".into(),
            email_id: "quality@plant.example".into(),
            password: String::new(),
            role: Role::Department,
            created_at,
            updated_at: created_at,
        };
        let department_token =
            create_jwt(&Claims::for_department(&department, 60), SECRET).unwrap();
        let app = init_service(test_app(state)).await;

        let req = TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(bearer(&admin))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let dashboard: Dashboard = read_body_json(resp).await;
        assert_eq!(dashboard.totals.issues, 2);
        assert_eq!(dashboard.totals.users, 1);

        let req = TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(bearer(&department_token))
            .to_request();
        let dashboard: Dashboard = read_body_json(call_service(&app, req).await).await;
        assert_eq!(dashboard.totals.issues, 1);
        assert_eq!(dashboard.issues_by_department.get("Maintenance"), None);
    }
}
