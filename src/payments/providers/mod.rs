pub mod card;
pub mod wallet;

pub use card::CardChargeAdapter;
pub use wallet::RedirectApprovalAdapter;
