use dotenv::dotenv;
use handlebars::Handlebars;
use log::*;
use sqlx::postgres::{PgPool, PgPoolOptions};

use std::env;
use std::sync::Arc;

mod api_models;
mod authorization;
mod errors;
mod identity;
mod lifecycle;
mod models;
mod store;
mod tally;
mod validation;
mod votes;

use crate::store::PgStore;
use crate::votes::VotePolicy;

/**
 * Construct the sqlx connection pool for postgresql
 */
async fn create_pool() -> Result<PgPool, sqlx::Error> {
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
}

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub db: PgStore,
    pub hb: Arc<Handlebars<'static>>,
    pub policy: VotePolicy,
}

/**
 * The routes module contains all the tide routes and the logic to fulfill
 * the responses for each route.
 *
 * The `api` module speaks JSON under /api/v1 and the `pages` module renders
 * the handlebars templates; both lean on the same engine underneath.
 */
mod routes {
    use tide::{Body, Request, Response, StatusCode};
    use uuid::Uuid;

    use crate::api_models::ErrorResponse;
    use crate::errors::PollError;
    use crate::AppState;

    /**
     * Look up and parse the `uuid` parameter on the request
     */
    fn requested_poll(req: &Request<AppState>) -> Result<Uuid, String> {
        let raw = match req.param::<String>("uuid") {
            Ok(raw) => raw,
            Err(_) => return Err("No uuid specified".to_string()),
        };

        Uuid::parse_str(&raw).map_err(|_| "Invalid uuid specified".to_string())
    }

    /**
     * A JSON `{"error": ...}` body with the given status
     */
    fn error_body(status: StatusCode, message: &str) -> Response {
        let body = Body::from_json(&ErrorResponse {
            error: message.to_string(),
        })
        .unwrap_or_else(|_| Body::from_string(message.to_string()));

        Response::builder(status).body(body).build()
    }

    fn engine_error(err: &PollError) -> Response {
        error_body(err.http_status(), &err.to_string())
    }

    pub mod api {
        pub mod polls {
            use log::*;
            use tide::{Body, Request, Response, StatusCode};

            use super::super::{engine_error, error_body, requested_poll};
            use crate::api_models::*;
            use crate::{identity, lifecycle, tally, votes, AppState};

            /**
             *  PUT /api/v1/polls
             */
            pub async fn create(mut req: Request<AppState>) -> tide::Result<Response> {
                let body: PollRequest = match req.body_json().await {
                    Ok(body) => body,
                    Err(err) => {
                        debug!("Unparseable poll body: {:?}", err);
                        return Ok(error_body(StatusCode::BadRequest, "Malformed poll body"));
                    }
                };

                let identity = identity::current_identity(&req);

                match lifecycle::create_poll(&req.state().db, &identity, &body.question, &body.options)
                    .await
                {
                    Ok(poll) => Ok(Response::builder(StatusCode::Created)
                        .body(Body::from_json(&PollResponse { error: None, poll })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  GET /api/v1/polls
             */
            pub async fn list(req: Request<AppState>) -> tide::Result<Response> {
                match lifecycle::list_polls(&req.state().db).await {
                    Ok(polls) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&PollListResponse { error: None, polls })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  GET /api/v1/polls/mine
             */
            pub async fn mine(req: Request<AppState>) -> tide::Result<Response> {
                let identity = identity::current_identity(&req);

                match lifecycle::polls_for(&req.state().db, &identity).await {
                    Ok(polls) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&PollListResponse { error: None, polls })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  GET /api/v1/polls/:uuid
             */
            pub async fn get(req: Request<AppState>) -> tide::Result<Response> {
                let uuid = match requested_poll(&req) {
                    Ok(uuid) => uuid,
                    Err(message) => return Ok(error_body(StatusCode::BadRequest, &message)),
                };

                match lifecycle::get_poll(&req.state().db, uuid).await {
                    Ok(poll) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&PollResponse { error: None, poll })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  POST /api/v1/polls/:uuid
             */
            pub async fn update(mut req: Request<AppState>) -> tide::Result<Response> {
                let uuid = match requested_poll(&req) {
                    Ok(uuid) => uuid,
                    Err(message) => return Ok(error_body(StatusCode::BadRequest, &message)),
                };

                let body: PollRequest = match req.body_json().await {
                    Ok(body) => body,
                    Err(err) => {
                        debug!("Unparseable poll body: {:?}", err);
                        return Ok(error_body(StatusCode::BadRequest, "Malformed poll body"));
                    }
                };

                let identity = identity::current_identity(&req);

                match lifecycle::update_poll(
                    &req.state().db,
                    &identity,
                    uuid,
                    &body.question,
                    &body.options,
                )
                .await
                {
                    Ok(poll) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&PollResponse { error: None, poll })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  DELETE /api/v1/polls/:uuid
             */
            pub async fn delete(req: Request<AppState>) -> tide::Result<Response> {
                let uuid = match requested_poll(&req) {
                    Ok(uuid) => uuid,
                    Err(message) => return Ok(error_body(StatusCode::BadRequest, &message)),
                };

                let identity = identity::current_identity(&req);

                match lifecycle::delete_poll(&req.state().db, &identity, uuid).await {
                    Ok(()) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&Acknowledged::ok())?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  POST /api/v1/polls/:uuid/vote
             */
            pub async fn vote(mut req: Request<AppState>) -> tide::Result<Response> {
                let uuid = match requested_poll(&req) {
                    Ok(uuid) => uuid,
                    Err(message) => return Ok(error_body(StatusCode::BadRequest, &message)),
                };

                let ballot: BallotRequest = match req.body_json().await {
                    Ok(ballot) => ballot,
                    Err(err) => {
                        debug!("Unparseable ballot: {:?}", err);
                        return Ok(error_body(StatusCode::BadRequest, "Malformed ballot"));
                    }
                };

                let identity = identity::current_identity(&req);
                let state = req.state();

                match votes::cast_vote(&state.db, state.policy, &identity, uuid, ballot.option)
                    .await
                {
                    Ok(()) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&Acknowledged::ok())?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }

            /**
             *  GET /api/v1/polls/:uuid/results
             */
            pub async fn results(req: Request<AppState>) -> tide::Result<Response> {
                let uuid = match requested_poll(&req) {
                    Ok(uuid) => uuid,
                    Err(message) => return Ok(error_body(StatusCode::BadRequest, &message)),
                };

                match tally::compute_results(&req.state().db, uuid).await {
                    Ok(results) => Ok(Response::builder(StatusCode::Ok)
                        .body(Body::from_json(&TallyResponse {
                            error: None,
                            poll: results.poll,
                            results: results.results,
                            total: results.total,
                        })?)
                        .build()),
                    Err(err) => Ok(engine_error(&err)),
                }
            }
        }
    }

    pub mod pages {
        use log::*;
        use serde_json::json;
        use tide::http::mime;
        use tide::{Redirect, Request, Response, StatusCode};

        use super::requested_poll;
        use crate::api_models::{PollForm, VoteForm};
        use crate::errors::PollError;
        use crate::{authorization, identity, lifecycle, tally, votes, AppState};

        /**
         * Decode an urlencoded form body.
         *
         * Browsers percent-encode the square brackets in field names like
         * `options[0]`, which serde_qs only tolerates in non-strict mode.
         */
        fn parse_form<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, serde_qs::Error> {
            serde_qs::Config::new(5, false).deserialize_str(body)
        }

        fn render(
            state: &AppState,
            template: &str,
            data: &serde_json::Value,
        ) -> tide::Result<Response> {
            match state.hb.render(template, data) {
                Ok(html) => Ok(Response::builder(StatusCode::Ok)
                    .content_type(mime::HTML)
                    .body(html)
                    .build()),
                Err(err) => {
                    error!("Failed to render {}: {}", template, err);
                    Ok(error_page(
                        StatusCode::InternalServerError,
                        "This page could not be rendered",
                    ))
                }
            }
        }

        /**
         * Fallback page assembled without the template registry, for when
         * there is no poll to hang a template on
         */
        fn error_page(status: StatusCode, message: &str) -> Response {
            let html = format!(
                r#"<!DOCTYPE html>
<html>
  <body>
    <h1>Well that didn't work</h1>
    <p>{}</p>
    <p><a href="/">Back to the polls</a></p>
  </body>
</html>"#,
                html_escape::encode_text(message)
            );

            Response::builder(status)
                .content_type(mime::HTML)
                .body(html)
                .build()
        }

        fn engine_error_page(err: &PollError) -> Response {
            error_page(err.http_status(), &err.to_string())
        }

        /**
         *  GET /
         */
        pub async fn index(req: Request<AppState>) -> tide::Result<Response> {
            let identity = identity::current_identity(&req);

            match lifecycle::list_polls(&req.state().db).await {
                Ok(polls) => render(
                    req.state(),
                    "index",
                    &json!({
                        "polls": polls,
                        "signed_in": !identity.is_anonymous(),
                    }),
                ),
                Err(err) => Ok(engine_error_page(&err)),
            }
        }

        /**
         *  GET /polls/new
         */
        pub async fn new_poll(req: Request<AppState>) -> tide::Result<Response> {
            if let Err(err) = identity::require_authenticated(&req) {
                return Ok(engine_error_page(&err));
            }
            render(req.state(), "new", &json!({}))
        }

        /**
         *  POST /polls/new
         */
        pub async fn create(mut req: Request<AppState>) -> tide::Result<Response> {
            let body = req.body_string().await?;
            let form: PollForm = match parse_form(&body) {
                Ok(form) => form,
                Err(err) => {
                    warn!("Unparseable poll form: {}", err);
                    return Ok(error_page(
                        StatusCode::BadRequest,
                        "That form submission made no sense",
                    ));
                }
            };

            let identity = identity::current_identity(&req);

            match lifecycle::create_poll(&req.state().db, &identity, &form.question, &form.options)
                .await
            {
                Ok(poll) => Ok(Redirect::see_other(format!("/polls/{}", poll.id)).into()),
                Err(err) => render(
                    req.state(),
                    "new",
                    &json!({
                        "error": err.to_string(),
                        "question": form.question,
                        "options": form.options,
                    }),
                ),
            }
        }

        /**
         *  GET /polls/:uuid
         */
        pub async fn poll(req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            let identity = identity::current_identity(&req);

            match lifecycle::get_poll(&req.state().db, uuid).await {
                Ok(poll) => {
                    let can_edit = authorization::can_mutate(&identity, &poll);
                    render(
                        req.state(),
                        "poll",
                        &json!({
                            "poll": poll,
                            "can_edit": can_edit,
                        }),
                    )
                }
                Err(err) => Ok(engine_error_page(&err)),
            }
        }

        /**
         *  POST /polls/:uuid/vote
         */
        pub async fn vote(mut req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            let body = req.body_string().await?;
            let form: VoteForm = match parse_form(&body) {
                Ok(form) => form,
                Err(_) => {
                    // a vote submitted with no option picked lands here
                    return vote_failed(&req, uuid, &PollError::InvalidOption).await;
                }
            };

            let identity = identity::current_identity(&req);
            let state = req.state();

            match votes::cast_vote(&state.db, state.policy, &identity, uuid, form.option).await {
                Ok(()) => Ok(Redirect::see_other(format!("/polls/{}/results", uuid)).into()),
                Err(err) => vote_failed(&req, uuid, &err).await,
            }
        }

        /**
         * Re-render the poll page with the failure inline, falling back to
         * the bare error page when the poll itself is the problem
         */
        async fn vote_failed(
            req: &Request<AppState>,
            uuid: uuid::Uuid,
            err: &PollError,
        ) -> tide::Result<Response> {
            let identity = identity::current_identity(req);

            match lifecycle::get_poll(&req.state().db, uuid).await {
                Ok(poll) => {
                    let can_edit = authorization::can_mutate(&identity, &poll);
                    let mut response = render(
                        req.state(),
                        "poll",
                        &json!({
                            "poll": poll,
                            "can_edit": can_edit,
                            "error": err.to_string(),
                        }),
                    )?;
                    response.set_status(err.http_status());
                    Ok(response)
                }
                Err(other) => Ok(engine_error_page(&other)),
            }
        }

        /**
         *  GET /polls/:uuid/results
         */
        pub async fn results(req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            match tally::compute_results(&req.state().db, uuid).await {
                Ok(results) => {
                    let rows: Vec<serde_json::Value> = results
                        .results
                        .iter()
                        .map(|row| {
                            json!({
                                "option": row.option,
                                "votes": row.votes,
                                "percent": tally::percentage(row.votes, results.total),
                            })
                        })
                        .collect();

                    render(
                        req.state(),
                        "results",
                        &json!({
                            "poll": results.poll,
                            "results": rows,
                            "total": results.total,
                        }),
                    )
                }
                Err(err) => Ok(engine_error_page(&err)),
            }
        }

        /**
         *  GET /polls/:uuid/edit
         */
        pub async fn edit(req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            let identity = identity::current_identity(&req);

            match lifecycle::get_poll(&req.state().db, uuid).await {
                Ok(poll) => {
                    if !authorization::can_mutate(&identity, &poll) {
                        return Ok(engine_error_page(&PollError::NotAuthorized));
                    }
                    render(
                        req.state(),
                        "edit",
                        &json!({
                            "poll": &poll,
                            "question": &poll.question,
                            "options": &poll.options,
                        }),
                    )
                }
                Err(err) => Ok(engine_error_page(&err)),
            }
        }

        /**
         *  POST /polls/:uuid/edit
         */
        pub async fn update(mut req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            let body = req.body_string().await?;
            let form: PollForm = match parse_form(&body) {
                Ok(form) => form,
                Err(err) => {
                    warn!("Unparseable poll form: {}", err);
                    return Ok(error_page(
                        StatusCode::BadRequest,
                        "That form submission made no sense",
                    ));
                }
            };

            let identity = identity::current_identity(&req);

            match lifecycle::update_poll(
                &req.state().db,
                &identity,
                uuid,
                &form.question,
                &form.options,
            )
            .await
            {
                Ok(poll) => Ok(Redirect::see_other(format!("/polls/{}", poll.id)).into()),
                Err(err) => render(
                    req.state(),
                    "edit",
                    &json!({
                        "poll": { "id": uuid },
                        "error": err.to_string(),
                        "question": form.question,
                        "options": form.options,
                    }),
                ),
            }
        }

        /**
         *  POST /polls/:uuid/delete
         */
        pub async fn delete(req: Request<AppState>) -> tide::Result<Response> {
            let uuid = match requested_poll(&req) {
                Ok(uuid) => uuid,
                Err(message) => return Ok(error_page(StatusCode::BadRequest, &message)),
            };

            let identity = identity::current_identity(&req);

            match lifecycle::delete_poll(&req.state().db, &identity, uuid).await {
                Ok(()) => Ok(Redirect::see_other("/").into()),
                Err(err) => Ok(engine_error_page(&err)),
            }
        }
    }
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    pretty_env_logger::init();
    dotenv().ok();

    let policy = match env::var("ANONYMOUS_VOTING").as_deref() {
        Ok("false") | Ok("no") | Ok("0") => VotePolicy::AuthenticatedOnly,
        _ => VotePolicy::Open,
    };
    info!("Vote policy: {:?}", policy);

    let port = env::var("PORT").unwrap_or_else(|_| "8000".to_string());

    let mut hb = Handlebars::new();
    hb.register_templates_directory(".hbs", "templates")
        .expect("Failed to load templates/");

    match create_pool().await {
        Ok(pool) => {
            let state = AppState {
                db: PgStore::new(pool),
                hb: Arc::new(hb),
                policy,
            };

            let mut app = tide::with_state(state);
            app.with(driftwood::ApacheCombinedLogger);

            app.at("/").get(routes::pages::index);
            app.at("/polls/new")
                .get(routes::pages::new_poll)
                .post(routes::pages::create);
            app.at("/polls/:uuid").get(routes::pages::poll);
            app.at("/polls/:uuid/vote").post(routes::pages::vote);
            app.at("/polls/:uuid/results").get(routes::pages::results);
            app.at("/polls/:uuid/edit")
                .get(routes::pages::edit)
                .post(routes::pages::update);
            app.at("/polls/:uuid/delete").post(routes::pages::delete);

            app.at("/api/v1/polls")
                .put(routes::api::polls::create)
                .get(routes::api::polls::list);
            app.at("/api/v1/polls/mine").get(routes::api::polls::mine);
            app.at("/api/v1/polls/:uuid")
                .get(routes::api::polls::get)
                .post(routes::api::polls::update)
                .delete(routes::api::polls::delete);
            app.at("/api/v1/polls/:uuid/vote")
                .post(routes::api::polls::vote);
            app.at("/api/v1/polls/:uuid/results")
                .get(routes::api::polls::results);

            app.listen(format!("0.0.0.0:{}", port)).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize pool! {:?}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, err))
        }
    }
}
