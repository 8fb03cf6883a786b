/// What the platform's HTTP login exposes to a platform-flavored
/// [`crate::CloudLink`]. Obtaining these three fields (username, session
/// cookie, xtoken) is an external collaborator — the login flow itself is
/// not reimplemented here.
#[derive(Clone, Debug)]
pub struct PlatformSession {
    pub session_id: String,
    pub username: String,
    pub xtoken: String,
}
