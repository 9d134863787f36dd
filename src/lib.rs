//! Client for the WebUntis mobile JSON-RPC API.
//!
//! The mobile endpoint (`jsonrpc_intern.do`) is undocumented; this crate
//! speaks it the way the official mobile apps do, anonymously by default.
//! [`connect`] resolves a school, fetches its master data snapshot and
//! returns a [`School`] handle for timetable queries:
//!
//! ```no_run
//! use untis_mobile::ElementType;
//!
//! # async fn demo() -> Result<(), untis_mobile::SchoolError> {
//! let school = untis_mobile::connect("melpomene.webuntis.com", "gym-musterstadt").await?;
//! if let Some(week) = school.next_week_with_data("5505", &ElementType::Class).await? {
//!     println!("{} lessons in the week of {}", week.lessons.len(), week.monday);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod master;
mod rpc;
mod school;
mod session;
mod timetable;
mod week;

pub use error::{ErrorKind, UntisError};
pub use master::{LookupError, MasterData, Record};
pub use rpc::AuthBlock;
pub use school::{School, SchoolError};
pub use session::{SchoolInfo, Session, SessionError, ANONYMOUS_USER};
pub use timetable::{ElementType, Lesson, ResolvedWeek, TimetableWeek};
pub use week::{week_bounds, WeekIter};

#[cfg(feature = "rustls")]
use hyper::{client::HttpConnector, Client};
#[cfg(feature = "rustls")]
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};

/// Connects anonymously to a school using a rustls HTTPS client.
#[cfg(feature = "rustls")]
pub async fn connect(
    server: &str,
    school: &str,
) -> Result<School<HttpsConnector<HttpConnector>>, SchoolError> {
    connect_with_credentials(server, school, ANONYMOUS_USER, "").await
}

/// [`connect`] with explicit credentials. The auth block carries the
/// username but its OTP stays zero, so servers that insist on real
/// authentication will reject the calls with `RequiredAuthentication`.
#[cfg(feature = "rustls")]
pub async fn connect_with_credentials(
    server: &str,
    school: &str,
    username: &str,
    password: &str,
) -> Result<School<HttpsConnector<HttpConnector>>, SchoolError> {
    let client = Client::builder().build(
        HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_only()
            .enable_http1()
            .build(),
    );
    School::new(Session::with_credentials(
        client, server, school, username, password,
    ))
    .await
}
