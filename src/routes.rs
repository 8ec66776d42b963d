use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::auth::{get_role, login, logout, register, Authentication};
use crate::dashboard_data::get_dashboard;
use crate::department::{
    create_department, delete_department, department_login, get_department, list_departments,
    update_department,
};
use crate::error::ApiError;
use crate::issue::{
    acknowledge_issue, assign_issue, delete_issue, escalate_issue, get_issue, issues_by_status,
    issues_for_department, list_issues, mark_as_read, my_issues, old_issues, report_issue,
    update_issue, update_issue_status, updated_issues,
};
use crate::models::Role;
use crate::team_management::{
    add_member, assign_team_leader, create_team, delete_team, get_team, list_teams,
    remove_member, remove_team_leader,
};
use crate::user_management::{create_user, delete_user, get_user_by_id, list_users, update_user};

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request(format!("Invalid request body: {}", err)).into()
}

/// Mounts the whole `/api` tree. Everything except the sign-in routes sits
/// behind the bearer-token gate.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(
            web::scope("/api")
                // AUTH
                .service(
                    web::scope("/auth")
                        .route("/register", web::post().to(register))
                        .route("/login", web::post().to(login))
                        .route("/getRole/{email}", web::get().to(get_role))
                        .service(
                            web::resource("/logout")
                                .wrap(Authentication::new())
                                .route(web::post().to(logout)),
                        ),
                )
                // DEPARTMENTS (login stays public)
                .route("/department/login", web::post().to(department_login))
                .service(
                    web::scope("/department")
                        .wrap(Authentication::new())
                        .route("", web::get().to(list_departments))
                        .route("", web::post().to(create_department))
                        .route("/{id}", web::get().to(get_department))
                        .route("/{id}", web::put().to(update_department))
                        .route("/{id}", web::delete().to(delete_department)),
                )
                // USERS
                .service(
                    web::scope("/users")
                        .wrap(Authentication::new())
                        .route("", web::get().to(list_users))
                        .route("", web::post().to(create_user))
                        .route("/{id}", web::get().to(get_user_by_id))
                        .route("/{id}", web::put().to(update_user))
                        .route("/{id}", web::delete().to(delete_user)),
                )
                // TEAMS
                .service(
                    web::scope("/teams")
                        .wrap(Authentication::new())
                        .route("", web::get().to(list_teams))
                        .route("", web::post().to(create_team))
                        .route("/{id}", web::get().to(get_team))
                        .route("/{id}", web::delete().to(delete_team))
                        .route("/{id}/members", web::post().to(add_member))
                        .route("/{id}/members/{user_id}", web::delete().to(remove_member)),
                )
                .service(
                    web::scope("/team-leader")
                        .wrap(Authentication::with_roles(&[Role::Admin]))
                        .route("/assign", web::put().to(assign_team_leader))
                        .route("/remove", web::put().to(remove_team_leader)),
                )
                // ISSUES (fixed paths before /{id})
                .service(
                    web::scope("/issues")
                        .wrap(Authentication::new())
                        .route("", web::get().to(list_issues))
                        .route("", web::post().to(report_issue))
                        .route("/mine", web::get().to(my_issues))
                        .route("/updated", web::get().to(updated_issues))
                        .route("/department/{name}", web::get().to(issues_for_department))
                        .route("/old/{id}", web::get().to(old_issues))
                        .route("/acknowledge/{id}", web::put().to(acknowledge_issue))
                        .route("/read/{id}", web::put().to(mark_as_read))
                        .route("/escalate/{id}", web::put().to(escalate_issue))
                        .route("/status/{id}", web::put().to(update_issue_status))
                        .route("/assign/{id}", web::put().to(assign_issue))
                        .route(
                            "/{status:open|acknowledged|in-progress|escalated|resolved|completed}",
                            web::get().to(issues_by_status),
                        )
                        .route("/{id}", web::get().to(get_issue))
                        .route("/{id}", web::put().to(update_issue))
                        .route("/{id}", web::delete().to(delete_issue)),
                )
                // DASHBOARD
                .service(
                    web::resource("/dashboard")
                        .wrap(Authentication::with_roles(&[Role::Admin, Role::Department]))
                        .route(web::get().to(get_dashboard)),
                ),
        );
}
