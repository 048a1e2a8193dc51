use tracing::info;

use crate::{
    analysis::{Advisory, AnalysisKey},
    events::AccountId,
};

pub trait CompanionNotifier: Send + Sync {
    fn account_changed(&self, account: AccountId);
    fn legacy_scoring_changed(&self, enabled: bool);
    fn console(&self, line: &str);
    fn advisory_ready(&self, key: &AnalysisKey, advisory: &Advisory);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

impl CompanionNotifier for TracingNotifier {
    fn account_changed(&self, account: AccountId) {
        info!(account, "viewing account changed");
    }

    fn legacy_scoring_changed(&self, enabled: bool) {
        if enabled {
            info!("legacy scoring rules enabled for this record");
        }
    }

    fn console(&self, line: &str) {
        info!("{line}");
    }

    fn advisory_ready(&self, key: &AnalysisKey, advisory: &Advisory) {
        info!(
            record = %key.match_id,
            seat = key.seat,
            actions = advisory.actions_analyzed,
            summary = %advisory.summary,
            "advisory ready"
        );
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::CompanionNotifier;
    use crate::{
        analysis::{Advisory, AnalysisKey},
        events::AccountId,
    };

    #[derive(Debug, Clone, PartialEq)]
    pub enum Notice {
        Account(AccountId),
        LegacyScoring(bool),
        Console(String),
        Advisory(AnalysisKey),
    }

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        pub fn accounts(&self) -> Vec<AccountId> {
            self.notices
                .lock()
                .expect("notice lock")
                .iter()
                .filter_map(|notice| match notice {
                    Notice::Account(id) => Some(*id),
                    _ => None,
                })
                .collect()
        }

        pub fn legacy_toggles(&self) -> Vec<bool> {
            self.notices
                .lock()
                .expect("notice lock")
                .iter()
                .filter_map(|notice| match notice {
                    Notice::LegacyScoring(on) => Some(*on),
                    _ => None,
                })
                .collect()
        }
    }

    impl CompanionNotifier for RecordingNotifier {
        fn account_changed(&self, account: AccountId) {
            self.notices
                .lock()
                .expect("notice lock")
                .push(Notice::Account(account));
        }

        fn legacy_scoring_changed(&self, enabled: bool) {
            self.notices
                .lock()
                .expect("notice lock")
                .push(Notice::LegacyScoring(enabled));
        }

        fn console(&self, line: &str) {
            self.notices
                .lock()
                .expect("notice lock")
                .push(Notice::Console(line.to_owned()));
        }

        fn advisory_ready(&self, key: &AnalysisKey, _advisory: &Advisory) {
            self.notices
                .lock()
                .expect("notice lock")
                .push(Notice::Advisory(key.clone()));
        }
    }
}
