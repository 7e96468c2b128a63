pub mod ledger_session;
