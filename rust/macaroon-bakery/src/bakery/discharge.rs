use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;

use crate::{
    Bakery, BakeryError, Caveat, Condition, Discharger, Macaroon,
    third_party::{OpenedTicket, open_ticket, split_verification_id},
};

impl Bakery {
    fn open_caveat<'a>(
        &self,
        caveat: &'a Caveat,
    ) -> Result<(&'a [u8], OpenedTicket), BakeryError> {
        let verification_id = caveat
            .verification_id()
            .ok_or_else(|| BakeryError::Malformed("Caveat has no verification ID".into()))?;
        let (ticket, _) = split_verification_id(verification_id)?;
        let opened = open_ticket(&self.key_pair, ticket)?;
        Ok((ticket, opened))
    }

    /// The condition a third-party caveat addressed to this bakery asks it to
    /// attest
    pub fn third_party_condition(&self, caveat: &Caveat) -> Result<Condition, BakeryError> {
        let (_, opened) = self.open_caveat(caveat)?;
        Ok(opened.condition)
    }

    /// Mint the discharge macaroon for a third-party caveat addressed to this
    /// bakery, without judging its condition. The result still has to be
    /// bound to the macaroon it travels with.
    pub fn discharge(&self, caveat: &Caveat) -> Result<Macaroon, BakeryError> {
        let (ticket, opened) = self.open_caveat(caveat)?;
        let discharge = Macaroon::mint(&opened.secret, ticket.to_vec(), self.location.clone());

        tracing::debug!(
            location = %self.location,
            key = opened.condition.key(),
            "Minted discharge macaroon"
        );
        Ok(discharge)
    }

    /// Collect a discharge for every third-party caveat on `root`, and on the
    /// discharges themselves, then bind them all to `root`.
    ///
    /// Returns `root` followed by the bound discharges, ready to be presented
    /// together.
    pub async fn discharge_all(
        &self,
        root: &Macaroon,
        discharger: &dyn Discharger,
    ) -> Result<Vec<Macaroon>, BakeryError> {
        let mut pending = third_party_caveats(root).collect::<VecDeque<_>>();
        let mut seen = HashSet::new();
        let mut discharges = Vec::new();

        while let Some(caveat) = pending.pop_front() {
            if !seen.insert(caveat.verification_id().map(<[u8]>::to_vec)) {
                continue;
            }
            let discharge = discharger.discharge(&caveat).await?;
            pending.extend(third_party_caveats(&discharge));
            discharges.push(discharge);
        }

        tracing::debug!(
            location = %self.location,
            discharges = discharges.len(),
            "Collected discharges"
        );

        let mut bundle = Vec::with_capacity(discharges.len() + 1);
        bundle.push(root.clone());
        bundle.extend(
            discharges
                .iter()
                .map(|discharge| discharge.bind_for_request(root)),
        );
        Ok(bundle)
    }
}

fn third_party_caveats(macaroon: &Macaroon) -> impl Iterator<Item = Caveat> + '_ {
    macaroon
        .caveats()
        .iter()
        .filter(|caveat| !caveat.is_first_party())
        .cloned()
}

/// A bakery discharges caveats addressed to it once its own verifiers are
/// satisfied by the decrypted condition.
#[async_trait]
impl Discharger for Bakery {
    async fn discharge(&self, caveat: &Caveat) -> Result<Macaroon, BakeryError> {
        let condition = self.third_party_condition(caveat)?;
        self.check_condition(&condition, &self.context(), &[])?;
        Bakery::discharge(self, caveat)
    }
}
