pub mod creation_request;
pub mod pay_invoice;
pub mod voucher;
pub mod withdraw_session;
