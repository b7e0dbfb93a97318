use common::{Chain, ContractInstance, Txid, Wallet};
use onchain_img_contract::{OnchainImg, PubKey};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::SessionError;

/// Where the session is in its request/response cycle with the wallet and chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingAuth,
    AwaitingBroadcast,
    Settled,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropKind {
    Deploy,
    Update,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropOutcome {
    pub kind: DropKind,
    pub txid: String,
    pub contract_id: String,
    pub current_outpoint: String,
}

/// Public view of the session, pushed to WebSocket clients on every change.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub public_key: Option<String>,
    pub contract_id: Option<String>,
    pub current_outpoint: Option<String>,
    pub script_hash: Option<String>,
    pub img_url: Option<String>,
}

struct Tracked {
    instance: ContractInstance,
    deploy_txid: Txid,
    txid: Txid,
    script_hash: String,
}

pub struct Session {
    wallet: Wallet,
    chain: Chain,
    amount: u64,
    public_key: RwLock<Option<PubKey>>,
    tracked: RwLock<Option<Tracked>>,
    phase: RwLock<Phase>,
    /// Held for the whole of a deploy or update.
    in_flight: Mutex<()>,
    events: broadcast::Sender<String>,
}

impl Session {
    pub fn new(wallet: Wallet, chain: Chain, amount: u64) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            wallet,
            chain,
            amount,
            public_key: RwLock::new(None),
            tracked: RwLock::new(None),
            phase: RwLock::new(Phase::Idle),
            in_flight: Mutex::new(()),
            events,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    /// Authenticate with the wallet and remember its default key.
    pub async fn connect(&self) -> Result<PubKey, SessionError> {
        self.set_phase(Phase::AwaitingAuth).await;
        let auth = self.wallet.request_auth().await;
        if !auth.is_authenticated {
            let err = SessionError::Auth(auth.error.unwrap_or_default());
            self.set_phase(Phase::Failed(err.to_string())).await;
            return Err(err);
        }
        let pubkey = self.wallet.default_pub_key().await?;
        *self.public_key.write().await = Some(pubkey);
        tracing::info!("Wallet connected: {}", pubkey);
        self.set_phase(Phase::Idle).await;
        Ok(pubkey)
    }

    /// Mint devnet funds for the wallet if it holds nothing.
    pub async fn fund_from_faucet(&self, sats: u64) -> Result<(), SessionError> {
        let script = self.wallet.p2pk_script().await?;
        let unspent = self
            .chain
            .unspent_for_script(&script)
            .await
            .map_err(common::InstanceError::from)?;
        if unspent.is_empty() {
            self.chain
                .faucet(script, sats)
                .await
                .map_err(common::InstanceError::from)?;
        }
        Ok(())
    }

    /// Handle a dropped file: deploy on the first drop, call `update_img`
    /// afterwards. Refused while a previous drop is still pending.
    pub async fn drop_file(&self, bytes: Vec<u8>) -> Result<DropOutcome, SessionError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| SessionError::UpdateInFlight)?;

        let pubkey = (*self.public_key.read().await).ok_or(SessionError::NotConnected)?;
        let current = self
            .tracked
            .read()
            .await
            .as_ref()
            .map(|tracked| tracked.instance.clone());

        self.set_phase(Phase::AwaitingBroadcast).await;
        let result = match current {
            None => self.deploy(pubkey, bytes).await,
            Some(instance) => self.update(instance, bytes).await,
        };

        match &result {
            Ok(outcome) => {
                tracing::info!("{:?} settled in {}", outcome.kind, outcome.txid);
                self.set_phase(Phase::Settled).await;
            }
            Err(e) => {
                tracing::error!("Drop failed: {}", e);
                self.set_phase(Phase::Failed(e.to_string())).await;
            }
        }
        result
    }

    async fn deploy(&self, pubkey: PubKey, bytes: Vec<u8>) -> Result<DropOutcome, SessionError> {
        let deployment = ContractInstance::new(OnchainImg::new(pubkey, bytes))
            .deploy(&self.wallet, &self.chain, self.amount)
            .await?;
        tracing::info!("deploy tx {}", deployment.txid);

        let outcome = DropOutcome {
            kind: DropKind::Deploy,
            txid: deployment.txid.to_string(),
            contract_id: format!("{}:0", deployment.txid),
            current_outpoint: format!("{}:0", deployment.txid),
        };
        *self.tracked.write().await = Some(Tracked {
            instance: deployment.instance,
            deploy_txid: deployment.txid,
            txid: deployment.txid,
            script_hash: deployment.script_hash,
        });
        Ok(outcome)
    }

    async fn update(
        &self,
        instance: ContractInstance,
        bytes: Vec<u8>,
    ) -> Result<DropOutcome, SessionError> {
        let call = instance
            .update_img(bytes, &self.wallet, &self.chain)
            .await?;
        tracing::info!("call tx {}", call.txid);

        let mut tracked = self.tracked.write().await;
        let tracked = tracked.as_mut().ok_or(SessionError::NotConnected)?;
        tracked.instance = call.next;
        tracked.txid = call.txid;
        Ok(DropOutcome {
            kind: DropKind::Update,
            txid: call.txid.to_string(),
            contract_id: format!("{}:0", tracked.deploy_txid),
            current_outpoint: format!("{}:0", call.txid),
        })
    }

    /// Current image bytes and the outpoint holding them.
    pub async fn image(&self) -> Option<(Vec<u8>, String)> {
        let tracked = self.tracked.read().await;
        let tracked = tracked.as_ref()?;
        let img = tracked.instance.contract().img_raw_bytes();
        if img.is_empty() {
            return None;
        }
        Some((img.to_vec(), format!("{}:0", tracked.txid)))
    }

    pub async fn snapshot(&self) -> Snapshot {
        let phase = self.phase.read().await.clone();
        let public_key = self.public_key.read().await.map(|pk| pk.to_hex());
        let tracked = self.tracked.read().await;
        let tracked = tracked.as_ref();
        Snapshot {
            phase,
            public_key,
            contract_id: tracked.map(|t| format!("{}:0", t.deploy_txid)),
            current_outpoint: tracked.map(|t| format!("{}:0", t.txid)),
            script_hash: tracked.map(|t| t.script_hash.clone()),
            img_url: tracked.and_then(|t| t.instance.img_to_base64_url()),
        }
    }

    async fn set_phase(&self, phase: Phase) {
        *self.phase.write().await = phase;
        self.publish().await;
    }

    async fn publish(&self) {
        let snapshot = self.snapshot().await;
        let event = serde_json::json!({ "type": "state", "state": snapshot });
        // No subscribers is fine.
        let _ = self.events.send(event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use common::{ChainError, InstanceError};

    async fn connected(funds: u64) -> Session {
        let session = Session::new(Wallet::generate(), Chain::in_memory(), 1);
        session.connect().await.unwrap();
        if funds > 0 {
            session.fund_from_faucet(funds).await.unwrap();
        }
        session
    }

    fn decode_url(url: &str) -> Vec<u8> {
        let encoded = url.strip_prefix("data:image/png;base64,").unwrap();
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_drop_deploys_then_updates() {
        let session = connected(10).await;

        let first = session.drop_file(b"first-img!".to_vec()).await.unwrap();
        assert_eq!(first.kind, DropKind::Deploy);
        assert_eq!(first.contract_id, first.current_outpoint);

        let img: Vec<u8> = (100u8..110).collect();
        let second = session.drop_file(img.clone()).await.unwrap();
        assert_eq!(second.kind, DropKind::Update);
        assert_eq!(second.contract_id, first.contract_id);
        assert_ne!(second.current_outpoint, first.current_outpoint);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Settled);
        assert_eq!(snapshot.current_outpoint.as_deref(), Some(second.current_outpoint.as_str()));
        assert_eq!(decode_url(&snapshot.img_url.unwrap()), img);

        let (bytes, outpoint) = session.image().await.unwrap();
        assert_eq!(bytes, img);
        assert_eq!(outpoint, second.current_outpoint);
    }

    #[tokio::test]
    async fn test_drop_refused_while_pending() {
        let session = connected(10).await;
        session.drop_file(b"genesis".to_vec()).await.unwrap();
        let before = session.snapshot().await.current_outpoint;

        let pending = session.in_flight.lock().await;
        assert!(matches!(
            session.drop_file(b"second".to_vec()).await,
            Err(SessionError::UpdateInFlight)
        ));
        drop(pending);

        assert_eq!(session.snapshot().await.current_outpoint, before);
        assert!(session.drop_file(b"third".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_before_connect() {
        let session = Session::new(Wallet::generate(), Chain::in_memory(), 1);
        assert!(matches!(
            session.drop_file(b"img".to_vec()).await,
            Err(SessionError::NotConnected)
        ));
        assert_eq!(session.snapshot().await.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_connect_with_locked_wallet() {
        let session = Session::new(Wallet::locked(), Chain::in_memory(), 1);
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Auth(_)));
        assert!(matches!(session.snapshot().await.phase, Phase::Failed(_)));
        assert!(session.snapshot().await.public_key.is_none());
    }

    #[tokio::test]
    async fn test_stale_instance_leaves_tracked_state() {
        let session = connected(10).await;
        session.drop_file(b"genesis".to_vec()).await.unwrap();
        let tracked_before = session.snapshot().await;

        // Another client advances the same contract first.
        let instance = session
            .tracked
            .read()
            .await
            .as_ref()
            .unwrap()
            .instance
            .clone();
        instance
            .update_img(b"elsewhere".to_vec(), &session.wallet, &session.chain)
            .await
            .unwrap();

        let err = session.drop_file(b"mine".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Instance(InstanceError::Chain(ChainError::MissingInput(_)))
        ));
        let after = session.snapshot().await;
        assert_eq!(after.current_outpoint, tracked_before.current_outpoint);
        assert_eq!(after.img_url, tracked_before.img_url);
        assert!(matches!(after.phase, Phase::Failed(_)));
    }

    #[tokio::test]
    async fn test_failed_deploy_tracks_nothing() {
        let session = connected(0).await;
        let err = session.drop_file(b"img".to_vec()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Instance(InstanceError::InsufficientFunds { .. })
        ));
        assert!(session.snapshot().await.contract_id.is_none());
        assert!(session.image().await.is_none());
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let session = connected(10).await;
        let mut events = session.subscribe();
        session.drop_file(b"img".to_vec()).await.unwrap();

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        let last: serde_json::Value = serde_json::from_str(&last.unwrap()).unwrap();
        assert_eq!(last["type"], "state");
        assert_eq!(last["state"]["phase"]["state"], "settled");
    }
}
