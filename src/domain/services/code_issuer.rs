//! Code/QR issuer - gives paying customers their referral code and QR image

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::entities::customer::Customer;
use crate::domain::errors::ReferralError;
use crate::domain::repositories::{CustomerRepository, QrRenderer, RepositoryError};
use crate::domain::value_objects::referral_code::ReferralCode;

/// Default number of candidates tried before giving up on a unique code
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 32;

/// Code and image stored on a customer
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCode {
    pub code: ReferralCode,
    pub qr_image: Option<Vec<u8>>,
}

pub struct CodeIssuer {
    customers: Arc<dyn CustomerRepository>,
    renderer: Arc<dyn QrRenderer>,
    max_attempts: u32,
}

impl CodeIssuer {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        renderer: Arc<dyn QrRenderer>,
        max_attempts: u32,
    ) -> Self {
        Self {
            customers,
            renderer,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Draw candidates until one is not used by any customer
    pub async fn generate_unique_code(&self, display_name: &str) -> Result<ReferralCode, ReferralError> {
        for attempt in 1..=self.max_attempts {
            let candidate = ReferralCode::generate(display_name, &mut rand::thread_rng());
            if !self.customers.referral_code_exists(candidate.as_str()).await? {
                return Ok(candidate);
            }
            debug!(
                "Referral code {} already taken (attempt {}/{})",
                candidate, attempt, self.max_attempts
            );
        }

        warn!(
            "Could not find a free referral code for '{}' after {} attempts",
            display_name, self.max_attempts
        );
        Err(ReferralError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Issue a code and QR image to a customer that needs one.
    ///
    /// Returns `Ok(None)` for non-paying customers and customers that already
    /// own a code. A QR rendering failure leaves the image empty. A code
    /// claimed by someone else between the check and the write is drawn again,
    /// within the same attempt budget.
    pub async fn issue(&self, customer: &Customer) -> Result<Option<IssuedCode>, ReferralError> {
        if !customer.needs_referral_code() {
            return Ok(None);
        }

        for attempt in 1..=self.max_attempts {
            let code = self.generate_unique_code(&customer.name).await?;
            let qr_image = self.renderer.render(code.as_str());
            if qr_image.is_none() {
                warn!("QR image unavailable for referral code {}", code);
            }

            match self
                .customers
                .set_referral_code(customer.id, code.as_str(), qr_image.as_deref())
                .await
            {
                Ok(()) => {
                    info!("Issued referral code {} to customer {}", code, customer.id);
                    return Ok(Some(IssuedCode { code, qr_image }));
                }
                Err(RepositoryError::Conflict(_)) => {
                    debug!(
                        "Referral code {} claimed concurrently (attempt {}/{})",
                        code, attempt, self.max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Could not store a free referral code for customer {} after {} attempts",
            customer.id, self.max_attempts
        );
        Err(ReferralError::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::customer::NewCustomer;
    use crate::persistence::init_database;
    use crate::persistence::repository::SqliteCustomerRepository;
    use crate::domain::repositories::RepositoryResult;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct StaticRenderer(Option<Vec<u8>>);

    impl QrRenderer for StaticRenderer {
        fn render(&self, _text: &str) -> Option<Vec<u8>> {
            self.0.clone()
        }
    }

    /// Every code is reported as taken
    struct SaturatedCustomers;

    #[async_trait]
    impl CustomerRepository for SaturatedCustomers {
        async fn create(&self, _customer: NewCustomer) -> RepositoryResult<Customer> {
            unimplemented!()
        }
        async fn get(&self, _id: i64) -> RepositoryResult<Option<Customer>> {
            Ok(None)
        }
        async fn find_by_referral_code(&self, _code: &str) -> RepositoryResult<Option<Customer>> {
            Ok(None)
        }
        async fn referral_code_exists(&self, _code: &str) -> RepositoryResult<bool> {
            Ok(true)
        }
        async fn set_referral_code(
            &self,
            _id: i64,
            _code: &str,
            _qr_image: Option<&[u8]>,
        ) -> RepositoryResult<()> {
            panic!("no code should be stored")
        }
        async fn set_referred_by(&self, _id: i64, _sponsor_id: i64) -> RepositoryResult<()> {
            Ok(())
        }
        async fn list_promo_candidates(
            &self,
            _min_finalized_orders: i64,
            _limit: i64,
        ) -> RepositoryResult<Vec<Customer>> {
            Ok(vec![])
        }
        async fn mark_referral_email_sent(&self, _id: i64) -> RepositoryResult<()> {
            Ok(())
        }
        async fn record_referral_email_failure(&self, _id: i64) -> RepositoryResult<()> {
            Ok(())
        }
    }

    /// Every code looks free, but the first `conflicts` writes lose the race
    /// to another issuer
    struct RacingCustomers {
        inner: SqliteCustomerRepository,
        conflicts: Mutex<u32>,
        attempted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CustomerRepository for RacingCustomers {
        async fn create(&self, customer: NewCustomer) -> RepositoryResult<Customer> {
            self.inner.create(customer).await
        }
        async fn get(&self, id: i64) -> RepositoryResult<Option<Customer>> {
            self.inner.get(id).await
        }
        async fn find_by_referral_code(&self, code: &str) -> RepositoryResult<Option<Customer>> {
            self.inner.find_by_referral_code(code).await
        }
        async fn referral_code_exists(&self, _code: &str) -> RepositoryResult<bool> {
            Ok(false)
        }
        async fn set_referral_code(
            &self,
            id: i64,
            code: &str,
            qr_image: Option<&[u8]>,
        ) -> RepositoryResult<()> {
            self.attempted.lock().unwrap().push(code.to_string());
            {
                let mut conflicts = self.conflicts.lock().unwrap();
                if *conflicts > 0 {
                    *conflicts -= 1;
                    return Err(RepositoryError::Conflict(code.to_string()));
                }
            }
            self.inner.set_referral_code(id, code, qr_image).await
        }
        async fn set_referred_by(&self, id: i64, sponsor_id: i64) -> RepositoryResult<()> {
            self.inner.set_referred_by(id, sponsor_id).await
        }
        async fn list_promo_candidates(
            &self,
            min_finalized_orders: i64,
            limit: i64,
        ) -> RepositoryResult<Vec<Customer>> {
            self.inner.list_promo_candidates(min_finalized_orders, limit).await
        }
        async fn mark_referral_email_sent(&self, id: i64) -> RepositoryResult<()> {
            self.inner.mark_referral_email_sent(id).await
        }
        async fn record_referral_email_failure(&self, id: i64) -> RepositoryResult<()> {
            self.inner.record_referral_email_failure(id).await
        }
    }

    async fn racing(conflicts: u32) -> Arc<RacingCustomers> {
        let pool = init_database("sqlite::memory:").await.unwrap();
        Arc::new(RacingCustomers {
            inner: SqliteCustomerRepository::new(pool),
            conflicts: Mutex::new(conflicts),
            attempted: Mutex::new(Vec::new()),
        })
    }

    async fn setup(image: Option<Vec<u8>>) -> (Arc<SqliteCustomerRepository>, CodeIssuer) {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let customers = Arc::new(SqliteCustomerRepository::new(pool));
        let issuer = CodeIssuer::new(
            customers.clone(),
            Arc::new(StaticRenderer(image)),
            DEFAULT_MAX_CODE_ATTEMPTS,
        );
        (customers, issuer)
    }

    #[tokio::test]
    async fn test_issue_stores_code_and_image() {
        let (customers, issuer) = setup(Some(vec![0x89, 0x50])).await;
        let alice = customers
            .create(NewCustomer {
                name: "Alice".to_string(),
                email: None,
                customer_rank: 1,
            })
            .await
            .unwrap();

        let issued = issuer.issue(&alice).await.unwrap().unwrap();
        assert!(issued.code.as_str().starts_with("REF-ALICE-"));

        let stored = customers.get(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.referral_code.as_deref(), Some(issued.code.as_str()));
        assert_eq!(stored.referral_qr_image, Some(vec![0x89, 0x50]));

        // Second call is a no-op once the code exists
        assert!(issuer.issue(&stored).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_issue_skips_non_paying_customers() {
        let (customers, issuer) = setup(None).await;
        let prospect = customers
            .create(NewCustomer {
                name: "Prospect".to_string(),
                email: None,
                customer_rank: 0,
            })
            .await
            .unwrap();

        assert!(issuer.issue(&prospect).await.unwrap().is_none());
        let stored = customers.get(prospect.id).await.unwrap().unwrap();
        assert!(stored.referral_code.is_none());
    }

    #[tokio::test]
    async fn test_issue_without_image_when_rendering_fails() {
        let (customers, issuer) = setup(None).await;
        let bob = customers
            .create(NewCustomer {
                name: "Bob".to_string(),
                email: None,
                customer_rank: 3,
            })
            .await
            .unwrap();

        let issued = issuer.issue(&bob).await.unwrap().unwrap();
        assert!(issued.qr_image.is_none());
        let stored = customers.get(bob.id).await.unwrap().unwrap();
        assert!(stored.referral_code.is_some());
        assert!(!stored.has_qr_image());
    }

    #[tokio::test]
    async fn test_colliding_names_get_distinct_codes() {
        let (customers, issuer) = setup(None).await;
        let mut codes = HashSet::new();

        // All of these clean down to "MARTIN"
        for name in ["Martin", "MARTIN", "martin!", "Martinez", "Martine Dupont", "M.a.r.t.i.n"] {
            let customer = customers
                .create(NewCustomer {
                    name: name.to_string(),
                    email: None,
                    customer_rank: 1,
                })
                .await
                .unwrap();
            let issued = issuer.issue(&customer).await.unwrap().unwrap();
            assert!(issued.code.as_str().starts_with("REF-MARTIN-"));
            assert!(codes.insert(issued.code), "duplicate code issued");
        }
    }

    #[tokio::test]
    async fn test_exhausted_code_space() {
        let issuer = CodeIssuer::new(
            Arc::new(SaturatedCustomers),
            Arc::new(StaticRenderer(None)),
            5,
        );
        let err = issuer.generate_unique_code("Alice").await.unwrap_err();
        assert!(matches!(err, ReferralError::CodeSpaceExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn test_code_claimed_concurrently_is_drawn_again() {
        let customers = racing(2).await;
        let issuer = CodeIssuer::new(customers.clone(), Arc::new(StaticRenderer(None)), 5);
        let alice = customers
            .create(NewCustomer {
                name: "Alice".to_string(),
                email: None,
                customer_rank: 1,
            })
            .await
            .unwrap();

        let issued = issuer.issue(&alice).await.unwrap().unwrap();
        assert_eq!(customers.attempted.lock().unwrap().len(), 3);

        let stored = customers.get(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.referral_code.as_deref(), Some(issued.code.as_str()));
    }

    #[tokio::test]
    async fn test_code_conflicts_stop_at_the_attempt_budget() {
        let customers = racing(u32::MAX).await;
        let issuer = CodeIssuer::new(customers.clone(), Arc::new(StaticRenderer(None)), 4);
        let alice = customers
            .create(NewCustomer {
                name: "Alice".to_string(),
                email: None,
                customer_rank: 1,
            })
            .await
            .unwrap();

        let err = issuer.issue(&alice).await.unwrap_err();
        assert!(matches!(err, ReferralError::CodeSpaceExhausted { attempts: 4 }));
        assert_eq!(customers.attempted.lock().unwrap().len(), 4);
        assert!(customers.get(alice.id).await.unwrap().unwrap().referral_code.is_none());
    }
}
