use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The fixed identifier of the single administrative account. Every
/// conversation thread has this id on one side.
pub const ADMIN_ID: &str = "admin";

/// Prefix of generated trading ids, followed by six random digits.
pub const TRADING_ID_PREFIX: &str = "#TRD-";

/// Banks and e-wallets accepted for deposits and withdrawals.
pub const BANKS: [&str; 12] = [
    "BDO",
    "BPI",
    "Metrobank",
    "Landbank",
    "PNB",
    "UnionBank",
    "RCBC",
    "Security Bank",
    "GCash",
    "PayMaya",
    "Coins.ph",
    "GrabPay",
];

/// A registered end user. `balance` is whole currency units and never
/// goes negative.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub amount_invested: i64,
    pub trading_id: String,
    pub balance: i64,
    pub profile_photo: Option<String>,
    pub dark_mode: bool,
    pub notifications: bool,
    pub created_at: i64,
}

impl User {
    /// Merges a partial update into the user, leaving absent fields
    /// untouched.
    pub fn apply_update(&mut self, updates: &UserUpdate) {
        if let Some(full_name) = &updates.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(email) = &updates.email {
            self.email = email.clone();
        }
        if let Some(phone) = &updates.phone {
            self.phone = phone.clone();
        }
        if let Some(profile_photo) = &updates.profile_photo {
            self.profile_photo = Some(profile_photo.clone());
        }
        if let Some(dark_mode) = updates.dark_mode {
            self.dark_mode = dark_mode;
        }
        if let Some(notifications) = updates.notifications {
            self.notifications = notifications;
        }
    }
}

/// A chat message between a user and the administrative account.
/// `content` is plain text, a data URI (photo/voice), or a JSON file
/// descriptor for file attachments. The `read` flag is stored but no
/// write path ever sets it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    pub read: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Photo,
    File,
    Voice,
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Text
    }
}

/// A wallet transaction. Withdrawals carry bank details; credits and
/// debits carry a company message.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub status: TransactionStatus,
    pub timestamp: i64,
    pub reference_number: Option<String>,
    pub bank_details: Option<BankDetails>,
    pub company_message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Credit,
    Debit,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    Completed,
}

impl TransactionStatus {
    /// Capitalized form used in notification titles.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Processing => "Processing",
            TransactionStatus::Approved => "Approved",
            TransactionStatus::Rejected => "Rejected",
            TransactionStatus::Completed => "Completed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BankDetails {
    pub bank: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub timestamp: i64,
    pub read: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Balance,
    Profit,
    Withdrawal,
    Message,
    Login,
}

// The kind/status enums are stored as lowercase TEXT columns.

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Photo => "photo",
            MessageKind::File => "file",
            MessageKind::Voice => "voice",
        }
    }
}

impl FromStr for MessageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "photo" => Ok(MessageKind::Photo),
            "file" => Ok(MessageKind::File),
            "voice" => Ok(MessageKind::Voice),
            _ => Err(()),
        }
    }
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "credit" => Ok(TransactionKind::Credit),
            "debit" => Ok(TransactionKind::Debit),
            _ => Err(()),
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Completed => "completed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            "completed" => Ok(TransactionStatus::Completed),
            _ => Err(()),
        }
    }
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Balance => "balance",
            NotificationKind::Profit => "profit",
            NotificationKind::Withdrawal => "withdrawal",
            NotificationKind::Message => "message",
            NotificationKind::Login => "login",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "balance" => Ok(NotificationKind::Balance),
            "profit" => Ok(NotificationKind::Profit),
            "withdrawal" => Ok(NotificationKind::Withdrawal),
            "message" => Ok(NotificationKind::Message),
            "login" => Ok(NotificationKind::Login),
            _ => Err(()),
        }
    }
}

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_str()?.parse().map_err(|_| FromSqlError::InvalidType)
            }
        }
    };
}

sql_text_enum!(MessageKind);
sql_text_enum!(TransactionKind);
sql_text_enum!(TransactionStatus);
sql_text_enum!(NotificationKind);

// Request and response payloads.

#[derive(Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub amount_invested: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Trading ID or email.
    pub identifier: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AdminLoginRequest {
    pub access_code: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SendMessageRequest {
    /// Required when the sender is the administrator; ignored otherwise.
    pub receiver_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DepositRequest {
    pub amount: i64,
    pub bank: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WithdrawRequest {
    pub bank: String,
    pub account_number: String,
    pub account_name: String,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdjustAction {
    Add,
    Remove,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WalletAdjustRequest {
    pub user_id: String,
    pub action: AdjustAction,
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WalletAdjustResponse {
    pub new_balance: i64,
    pub transaction: Transaction,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WithdrawalStatusUpdate {
    pub status: TransactionStatus,
    pub message: Option<String>,
}

/// Partial user update; `None` fields are left unchanged. Balance is
/// deliberately absent: balance changes go through the wallet
/// adjustment and withdrawal paths only.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub profile_photo: Option<String>,
    pub dark_mode: Option<bool>,
    pub notifications: Option<bool>,
}

/// Payout account a user links from their profile. Kept in the device
/// store, namespaced per user, never in the database.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LinkedAccount {
    pub bank: String,
    pub account_number: String,
    pub account_name: String,
}

/// Administrator profile entry in the device store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminProfile {
    pub manager_name: String,
    pub company_name: String,
    pub profile_photo: String,
    pub dark_mode: bool,
    pub notifications: bool,
}

impl Default for AdminProfile {
    fn default() -> Self {
        AdminProfile {
            manager_name: "John Smith".to_string(),
            company_name: "TradeChat Trading".to_string(),
            profile_photo: String::new(),
            dark_mode: false,
            notifications: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TypingRequest {
    /// For the administrator: which user's thread is being typed into.
    pub user_id: Option<String>,
    pub is_typing: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TypingResponse {
    pub is_typing: bool,
}

/// Formats a whole currency amount with thousands separators, e.g.
/// `12345` -> `"12,345"`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_groups_thousands() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(500), "500");
        assert_eq!(format_amount(1000), "1,000");
        assert_eq!(format_amount(1234567), "1,234,567");
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Approved,
            TransactionStatus::Rejected,
            TransactionStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
    }
}
