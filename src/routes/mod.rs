use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{admin, auth, carpooling, cars, me, reviews};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::middleware::user_rate_limit::create_user_governor;
use crate::AppState;

/// Application routes. The IP-based governor is applied by the server
/// binary so tests can drive the router without a peer address.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // Public catalog and search
    let public_routes = Router::new()
        .route("/carpoolings", get(carpooling::list_carpoolings))
        .route("/carpoolings/{id}", get(carpooling::get_carpooling))
        .route("/brands", get(cars::list_brands))
        .route("/users/{id}/reviews", get(reviews::user_reviews));

    // Any authenticated user, limited per account
    let user_routes = Router::new()
        .route("/carpoolings", post(carpooling::create_carpooling))
        .route("/carpoolings/{id}/join", post(carpooling::join_carpooling))
        .route("/carpoolings/{id}/leave", post(carpooling::leave_carpooling))
        .route("/carpoolings/{id}/cancel", post(carpooling::cancel_carpooling))
        .route("/carpoolings/{id}/complete", post(carpooling::complete_carpooling))
        .route("/carpoolings/{id}/passengers", get(carpooling::carpooling_passengers))
        .route("/me", get(me::get_profile).put(me::update_profile))
        .route("/me/carpoolings", get(carpooling::my_carpoolings))
        .route("/cars", get(cars::my_cars).post(cars::create_car))
        .route("/cars/{id}", delete(cars::delete_car))
        .route("/reviews", post(reviews::create_review))
        .layer(create_user_governor())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_all_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/brands", post(admin::create_brand))
        .route("/reviews", get(admin::list_reviews))
        .route("/reviews/{id}", put(admin::moderate_review))
        .route("/carpoolings/{id}/complete", post(admin::complete_carpooling))
        .route("/carpoolings/{id}", delete(admin::delete_carpooling))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .merge(public_routes)
        .merge(user_routes)
        .nest("/admin", admin_routes);

    Router::new().nest("/api", api).with_state(state)
}
