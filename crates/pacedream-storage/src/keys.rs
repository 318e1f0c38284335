//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Access + refresh token pair and expiry (JSON)
    pub const SESSION: &'static str = "session";

    /// Backend user ID
    pub const USER_ID: &'static str = "user_id";

    /// Raw profile payload kept for offline display
    pub const CACHED_USER: &'static str = "cached_user";

    /// Checkout session to resume after relaunch
    pub const CHECKOUT_SESSION_ID: &'static str = "checkout_session_id";

    /// Booking type of the checkout to resume
    pub const CHECKOUT_BOOKING_TYPE: &'static str = "checkout_booking_type";

    /// Every key, for wholesale clearing.
    pub const ALL: [&'static str; 5] = [
        Self::SESSION,
        Self::USER_ID,
        Self::CACHED_USER,
        Self::CHECKOUT_SESSION_ID,
        Self::CHECKOUT_BOOKING_TYPE,
    ];
}
