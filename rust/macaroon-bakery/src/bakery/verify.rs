use crate::{
    Bakery, BakeryError, Caveat, CaveatVerifier, Condition, Macaroon, VerificationContext,
    VerificationFailure, Verdict,
    crypto::{Signature, bind_for_request, signatures_match},
    macaroon::replay_chain,
    third_party::{split_verification_id, unwrap_secret},
};

/// The outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// ID of the root key the macaroon was minted from
    pub key_id: String,
    /// Every first-party condition that was checked, including those on
    /// discharge macaroons, in the order they were checked
    pub conditions: Vec<Condition>,
}

impl Verified {
    /// The first verified condition constraining `key`
    pub fn find_condition(&self, key: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|condition| condition.key() == key)
    }
}

impl Bakery {
    /// Verify `macaroon` and every caveat on it.
    ///
    /// The bakery's own verifiers run alongside `verifiers`. Third-party
    /// caveats are satisfied from `discharges`, which must already be bound
    /// to `macaroon` with [Macaroon::bind_for_request]. Any failure rejects
    /// the whole macaroon.
    pub async fn verify(
        &self,
        macaroon: &Macaroon,
        context: &VerificationContext,
        verifiers: &[&dyn CaveatVerifier],
        discharges: &[Macaroon],
    ) -> Result<Verified, BakeryError> {
        let key_id = macaroon.key_id()?;
        let root_key = self.root_keys.get(&key_id).await?;

        let chain = replay_chain(root_key.key(), macaroon.identifier(), macaroon.caveats());
        let computed = chain.last().ok_or(BakeryError::SignatureMismatch)?;
        if !signatures_match(computed, macaroon.signature()) {
            tracing::warn!(key_id = %key_id, "Macaroon signature mismatch");
            return Err(BakeryError::SignatureMismatch);
        }

        let mut session = Session {
            bakery: self,
            verifiers,
            context,
            root_signature: macaroon.signature(),
            discharges,
            used: vec![false; discharges.len()],
            conditions: Vec::new(),
        };
        session.check_caveats(macaroon.caveats(), &chain)?;

        tracing::debug!(
            key_id = %key_id,
            conditions = session.conditions.len(),
            discharges = discharges.len(),
            "Verified macaroon"
        );
        Ok(Verified {
            key_id,
            conditions: session.conditions,
        })
    }

    /// Ask every verifier about `condition`. One rejection is final; otherwise
    /// at least one verifier must be satisfied.
    pub(super) fn check_condition(
        &self,
        condition: &Condition,
        context: &VerificationContext,
        verifiers: &[&dyn CaveatVerifier],
    ) -> Result<(), BakeryError> {
        let verdicts = self
            .verifiers
            .iter()
            .map(|verifier| verifier.verify(condition, context))
            .chain(
                verifiers
                    .iter()
                    .map(|verifier| verifier.verify(condition, context)),
            );

        let mut satisfied = false;
        for verdict in verdicts {
            match verdict {
                Verdict::Satisfied => satisfied = true,
                Verdict::NotApplicable => {}
                Verdict::Rejected(rejection) => {
                    tracing::debug!(key = condition.key(), %rejection, "Caveat rejected");
                    return Err(VerificationFailure::Rejected(rejection).into());
                }
            }
        }

        if !satisfied {
            tracing::debug!(key = condition.key(), "Caveat unsatisfied");
            return Err(VerificationFailure::Unsatisfied(condition.to_string()).into());
        }
        Ok(())
    }
}

struct Session<'a> {
    bakery: &'a Bakery,
    verifiers: &'a [&'a dyn CaveatVerifier],
    context: &'a VerificationContext,
    root_signature: &'a Signature,
    discharges: &'a [Macaroon],
    used: Vec<bool>,
    conditions: Vec<Condition>,
}

impl Session<'_> {
    /// `chain[i]` is the signature in effect before `caveats[i]`
    fn check_caveats(
        &mut self,
        caveats: &[Caveat],
        chain: &[Signature],
    ) -> Result<(), BakeryError> {
        for (caveat, previous) in caveats.iter().zip(chain) {
            if caveat.is_first_party() {
                self.check_condition(caveat.condition())?;
            } else {
                self.check_third_party(caveat, previous)?;
            }
        }
        Ok(())
    }

    fn check_condition(&mut self, condition: &Condition) -> Result<(), BakeryError> {
        self.bakery
            .check_condition(condition, self.context, self.verifiers)?;
        self.conditions.push(condition.clone());
        Ok(())
    }

    fn check_third_party(
        &mut self,
        caveat: &Caveat,
        previous: &Signature,
    ) -> Result<(), BakeryError> {
        let location = caveat.location().unwrap_or_default();
        let malformed =
            |error: BakeryError| VerificationFailure::MalformedCaveat(error.to_string());

        let verification_id = caveat.verification_id().ok_or_else(|| {
            VerificationFailure::MalformedCaveat(format!(
                "third-party caveat for {location} has no verification ID"
            ))
        })?;
        let (ticket, wrapped_secret) =
            split_verification_id(verification_id).map_err(malformed)?;
        let index = self.claim_discharge(ticket, location)?;
        let discharges = self.discharges;
        let discharge = &discharges[index];

        let secret = unwrap_secret(previous, wrapped_secret).map_err(malformed)?;

        let chain = replay_chain(&secret, discharge.identifier(), discharge.caveats());
        let unbound = chain.last().ok_or(BakeryError::SignatureMismatch)?;
        let expected = bind_for_request(self.root_signature, unbound);
        if !signatures_match(&expected, discharge.signature()) {
            tracing::warn!(location, "Discharge macaroon signature mismatch");
            return Err(BakeryError::SignatureMismatch);
        }

        self.check_caveats(discharge.caveats(), &chain)
    }

    /// Find an unused discharge whose identifier is `ticket` and mark it used
    fn claim_discharge(&mut self, ticket: &[u8], location: &str) -> Result<usize, BakeryError> {
        let mut seen = false;
        for (index, discharge) in self.discharges.iter().enumerate() {
            if discharge.identifier() != ticket {
                continue;
            }
            if self.used[index] {
                seen = true;
                continue;
            }
            self.used[index] = true;
            return Ok(index);
        }

        Err(if seen {
            VerificationFailure::DischargeReused
        } else {
            VerificationFailure::MissingDischarge(location.to_string())
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Bakery, BakeryBuilder, BakeryError, Caveat, CaveatVerifier, Condition,
        ExactCaveatVerifier, LOCAL_LOCATION, Macaroon, MemoryRootKeyStore,
        MemoryThirdPartyKeyStore, Rejection, VerificationContext, VerificationFailure, Verdict,
    };
    use testresult::TestResult;

    async fn bakery() -> Result<Bakery, BakeryError> {
        BakeryBuilder::new(
            "https://bakery.test",
            MemoryRootKeyStore::new(),
            MemoryThirdPartyKeyStore::new(),
        )
        .build()
        .await
    }

    async fn with_third_party_caveat(bakery: &Bakery) -> Result<Macaroon, BakeryError> {
        bakery
            .create_macaroon(vec![Caveat::third_party(
                LOCAL_LOCATION,
                Condition::equals("user", "bob")?,
            )])
            .await
    }

    #[tokio::test]
    async fn a_fresh_macaroon_verifies() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = bakery.create_macaroon(Vec::new()).await?;

        let verified = bakery.verify(&macaroon, &bakery.context(), &[], &[]).await?;
        assert_eq!(verified.key_id, "0");
        assert!(verified.conditions.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_conditions_are_unsatisfied() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = bakery
            .create_macaroon(vec![Caveat::first_party(Condition::equals("user", "bob")?)])
            .await?;

        let result = bakery.verify(&macaroon, &bakery.context(), &[], &[]).await;
        assert!(matches!(
            result,
            Err(BakeryError::VerificationFailure(VerificationFailure::Unsatisfied(condition)))
                if condition == "user = bob"
        ));

        let verifier = ExactCaveatVerifier::new("user = bob");
        let verified = bakery
            .verify(&macaroon, &bakery.context(), &[&verifier], &[])
            .await?;
        assert_eq!(
            verified.find_condition("user").map(Condition::value),
            Some("bob")
        );
        Ok(())
    }

    #[tokio::test]
    async fn one_rejection_outweighs_a_satisfied_verifier() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = bakery
            .create_macaroon(vec![Caveat::first_party(Condition::equals("role", "x")?)])
            .await?;

        let exact = ExactCaveatVerifier::new("role = x");
        let rejecting = |condition: &Condition, _: &VerificationContext| {
            if condition.key() == "role" {
                Verdict::Rejected(Rejection::Invalid("no".into()))
            } else {
                Verdict::NotApplicable
            }
        };

        let orders: [[&dyn CaveatVerifier; 2]; 2] = [[&exact, &rejecting], [&rejecting, &exact]];
        for verifiers in orders {
            let result = bakery
                .verify(&macaroon, &bakery.context(), &verifiers, &[])
                .await;
            assert!(matches!(
                result,
                Err(BakeryError::VerificationFailure(VerificationFailure::Rejected(
                    Rejection::Invalid(reason)
                ))) if reason == "no"
            ));
        }

        bakery
            .verify(&macaroon, &bakery.context(), &[&exact], &[])
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn third_party_caveats_need_a_discharge() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = with_third_party_caveat(&bakery).await?;

        let result = bakery.verify(&macaroon, &bakery.context(), &[], &[]).await;
        assert!(matches!(
            result,
            Err(BakeryError::VerificationFailure(VerificationFailure::MissingDischarge(location)))
                if location == LOCAL_LOCATION
        ));
        Ok(())
    }

    #[tokio::test]
    async fn discharges_must_be_bound_to_the_root() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = with_third_party_caveat(&bakery).await?;
        let caveat = macaroon.caveats().last().ok_or("no caveat")?;
        let discharge = bakery.discharge(caveat)?;

        let unbound = bakery
            .verify(&macaroon, &bakery.context(), &[], &[discharge.clone()])
            .await;
        assert!(matches!(unbound, Err(BakeryError::SignatureMismatch)));

        let bound = discharge.bind_for_request(&macaroon);
        bakery
            .verify(&macaroon, &bakery.context(), &[], &[bound])
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn a_discharge_satisfies_only_one_caveat() -> TestResult {
        let bakery = bakery().await?;
        let macaroon = with_third_party_caveat(&bakery).await?;
        let caveat = macaroon.caveats().last().ok_or("no caveat")?.clone();

        let doubled = macaroon.append(caveat.clone());
        let discharge = bakery.discharge(&caveat)?.bind_for_request(&doubled);

        let result = bakery
            .verify(&doubled, &bakery.context(), &[], &[discharge])
            .await;
        assert!(matches!(
            result,
            Err(BakeryError::VerificationFailure(VerificationFailure::DischargeReused))
        ));
        Ok(())
    }
}
