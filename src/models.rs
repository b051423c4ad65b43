use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredAccount {
    pub id: i64,
    pub name: String,
    pub account_number: i64,
    pub sub_account: i64,
    pub branch_code: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSnapshot {
    pub id: i64,
    pub account_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub observed_at: String,
}

/// A stored bank-statement line. `id` is the insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub booking: ParsedTransaction,
}

/// One booking as read from the turnover export, before it is tied to an account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTransaction {
    pub booking_date: String,
    pub value_date: String,
    pub purpose: String,
    pub purpose2: String,
    pub iban: String,
    pub bic: String,
    pub customer_reference: String,
    pub mandate_reference: String,
    pub creditor_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Everything one export page yields.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub balance: Decimal,
    pub currency: String,
    pub transactions: Vec<ParsedTransaction>,
}
