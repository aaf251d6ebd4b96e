pub mod mail_relay;
pub mod qr_png;
