//! Route handlers. One method per [`Route`], each reading or mutating the
//! stores and then replying to the caller or fanning out to every session.

use anyhow::{Context, Result};

use digsite_engine::ids::ShortId;
use digsite_engine::players::{PlayerProfile, ScalarData};
use digsite_engine::world::position::Position;
use digsite_engine::world::tiles::{SetTileOutcome, Tile};
use digsite_engine::world::WorldState;

use super::connection::{Binding, Connection, Phase};
use crate::broadcast::pages;
use crate::protocol::{
    self, ChestItemPayload, DropItemPayload, Envelope, InventoryItemPayload, Message,
    PlacedItemPayload, PublicPlayerData, RemoveDroppedItemPayload, Route, GAME, HANDSHAKE,
    STATUS_OK, STATUS_UNSUPPORTED_GAME_VERSION,
};

impl Connection {
    pub(super) async fn dispatch(&mut self, route: Route, env: Envelope) -> Result<()> {
        let session = match route {
            Route::RequestId => return self.request_id().await,
            Route::RequestConnect => return self.request_connect(&env).await,
            _ => self
                .binding
                .clone()
                .context("game operation without a session")?,
        };

        match route {
            Route::RequestId | Route::RequestConnect => Ok(()),

            // ── Replies to the caller ────────────────────────────────────
            Route::RequestMapData => self.request_map_data().await,
            Route::RequestMapTiles => self.request_map_tiles().await,
            Route::RequestMapDroppedItems => self.request_map_dropped_items().await,
            Route::RequestClients => self.request_clients().await,
            Route::RequestPlayerSpawnPoint => {
                let profile = self.profile(&session)?;
                self.send_game("responseplayerspawnpoint", profile.position).await
            }
            Route::RequestPlayerInventory => {
                let profile = self.profile(&session)?;
                self.send_game("responseplayerinventory", &profile.inventory).await
            }
            Route::RequestPlayerData => {
                let profile = self.profile(&session)?;
                self.send_game("responseplayerdata", profile.scalar_data()).await
            }

            // ── Player mutations ─────────────────────────────────────────
            Route::PlayerPosition => self.player_position(&session, &env),
            Route::PlayerHandRotation => {
                self.fan_out(&session.id, "playerhandrotation", &env.data)
            }
            Route::UpdatePlayerData => self.update_player_data(&session, &env),
            Route::AddInventoryItem => self.add_inventory_item(&session, &env),

            // ── World mutations ──────────────────────────────────────────
            Route::SetTile => self.set_tile(&session, &env),
            Route::DropItem => self.drop_item(&session, &env),
            Route::RemoveDroppedItem => self.remove_dropped_item(&session, &env),
            Route::RequestMapPlacedItems => self.placed_items_changed(&session.id, |_| {}),
            Route::AddMapPlacedItem => {
                let p: PlacedItemPayload = env.payload()?;
                self.placed_items_changed(&session.id, |world| {
                    world.add_placed_item(p.x, p.y, &p.kind);
                })
            }
            Route::RemoveMapPlacedItem => {
                let p: PlacedItemAt = env.payload()?;
                self.placed_items_changed(&session.id, |world| {
                    world.remove_placed_item(p.x, p.y);
                })
            }
            Route::AddChestItem => self.add_chest_item(&session, &env),
        }
    }

    // ── Handshake ────────────────────────────────────────────────────────

    async fn request_id(&mut self) -> Result<()> {
        let id = self.state.sessions.issue_session_id(self.conn_id);
        let reply = Message::new(HANDSHAKE, "responseid").data(&id)?.encode()?;
        self.issued = Some(id);
        self.reply(reply).await
    }

    async fn request_connect(&mut self, env: &Envelope) -> Result<()> {
        let version = env
            .game_version
            .as_deref()
            .context("requestconnect without game_version")?;

        let status = if version != self.state.game_version() {
            tracing::info!(
                "Connection {}: rejected game version {} (server runs {})",
                self.conn_id,
                version,
                self.state.game_version()
            );
            STATUS_UNSUPPORTED_GAME_VERSION
        } else {
            let id = self.choose_session_id(env.client_id());
            let identity = env
                .os_uid
                .as_deref()
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| id.to_string());
            let session = self.state.connect_session(
                id.clone(),
                &identity,
                env.username(),
                self.conn_id,
                self.outbox.clone(),
            )?;
            tracing::info!("{} ({}) has joined the server", session.username, session.id);
            self.binding = Some(Binding { id, identity });
            self.phase = Phase::Connected;
            STATUS_OK
        };

        let reply = Message::new(HANDSHAKE, "responseconnect")
            .data(status)?
            .encode()?;
        self.reply(reply).await?;
        self.reply(protocol::sync_time(self.state.world_time())?)
            .await
    }

    /// The id the client names, else the one we issued it, else a new one.
    fn choose_session_id(&mut self, requested: &str) -> ShortId {
        if !requested.is_empty() {
            return ShortId::from(requested);
        }
        self.issued
            .take()
            .unwrap_or_else(|| self.state.sessions.issue_session_id(self.conn_id))
    }

    // ── Queries ──────────────────────────────────────────────────────────

    async fn request_map_data(&self) -> Result<()> {
        let data = self
            .state
            .read_config(|config| serde_json::to_value(config.map_data()))
            .context("encoding map data")?;
        self.send_game("responsemapdata", data).await
    }

    async fn request_map_tiles(&self) -> Result<()> {
        let tiles = self.state.read_world(|world| world.tiles().to_vec());
        for page in pages(&tiles) {
            self.send_game("responsemaptiles", page).await?;
        }
        Ok(())
    }

    async fn request_map_dropped_items(&self) -> Result<()> {
        let items = self.state.read_world(|world| world.dropped_items().entries());
        for page in pages(&items) {
            self.send_game("responsemapdroppeditems", page).await?;
        }
        Ok(())
    }

    async fn request_clients(&self) -> Result<()> {
        let roster = self.state.sessions.list_all();
        self.send_game("responseclients", roster).await
    }

    fn profile(&self, session: &Binding) -> Result<PlayerProfile> {
        self.state
            .players
            .get(&session.identity)
            .with_context(|| format!("no profile for identity {}", session.identity))
    }

    // ── Player mutations ─────────────────────────────────────────────────

    fn player_position(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let position: Position = env.payload()?;
        self.state
            .players
            .update_position(&session.identity, position);
        self.state.sessions.update_position(&session.id, position);
        self.fan_out(&session.id, "playerposition", &env.data)
    }

    fn update_player_data(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let data: ScalarData = env.payload()?;
        let public = PublicPlayerData {
            has_flashlight: data.has_flashlight,
            holding_item: &data.holding_item,
            current_drill_level: data.current_drill_level,
        };
        let msg = Message::game("playerdataresponse", session.id.as_str())
            .data(public)?
            .encode()?;
        self.state
            .players
            .update_scalar_data(&session.identity, data);
        self.state.broadcast(None, &msg);
        Ok(())
    }

    fn add_inventory_item(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let p: InventoryItemPayload = env.payload()?;
        let item = p.block_id.as_key();
        if let Some(total) = self
            .state
            .players
            .add_inventory(&session.identity, &item, p.count)
            .transpose()
            .context("addinventoryitem refused")?
        {
            tracing::debug!("{}: item {} now x{}", session.identity, item, total);
        }
        Ok(())
    }

    // ── World mutations ──────────────────────────────────────────────────

    fn set_tile(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let tile: Tile = env.payload()?;
        let outcome = self
            .state
            .write_world(|world| world.set_tile(tile.x, tile.y, tile.id));
        if outcome == SetTileOutcome::Unchanged {
            tracing::debug!("settile ({}, {}) already {}", tile.x, tile.y, tile.id);
        }
        self.fan_out(&session.id, "settile", &env.data)
    }

    fn drop_item(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let p: DropItemPayload = env.payload()?;
        let entry = self.state.write_world(|world| world.drop_item(p.x, p.y, p.id));
        self.fan_out(&session.id, "dropitem", &entry)
    }

    fn remove_dropped_item(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let p: RemoveDroppedItemPayload = env.payload()?;
        self.state
            .write_world(|world| world.remove_dropped_item(&p.uid));
        self.fan_out(&session.id, "removedroppeditem", &env.data)
    }

    /// Apply `mutate`, then send everyone the whole placed-item list.
    fn placed_items_changed(
        &self,
        origin: &ShortId,
        mutate: impl FnOnce(&mut WorldState),
    ) -> Result<()> {
        let msg = self.state.write_world(|world| {
            mutate(world);
            Message::game("responsemapplaceditems", origin.as_str())
                .data(world.placed_items().as_slice())
        })?;
        self.state.broadcast(None, &msg.encode()?);
        Ok(())
    }

    fn add_chest_item(&self, session: &Binding, env: &Envelope) -> Result<()> {
        let p: ChestItemPayload = env.payload()?;
        let total = self
            .state
            .write_world(|world| world.add_chest_item(&p.chest_id, &p.block_id.as_key(), p.count))
            .transpose()
            .context("addchestitem refused")?;
        if total.is_none() {
            tracing::debug!("addchestitem for unknown chest {}", p.chest_id);
        }
        self.fan_out(&session.id, "addchestitem", &p)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn send_game(&self, kind: &str, data: impl serde::Serialize) -> Result<()> {
        let frame = Message::new(GAME, kind).data(data)?.encode()?;
        self.reply(frame).await
    }

    /// Broadcast `data` to every session, attributed to `origin`.
    fn fan_out(&self, origin: &ShortId, kind: &str, data: impl serde::Serialize) -> Result<()> {
        let msg = Message::game(kind, origin.as_str()).data(data)?.encode()?;
        self.state.broadcast(None, &msg);
        Ok(())
    }
}

#[derive(Debug, serde::Deserialize)]
struct PlacedItemAt {
    x: f64,
    y: f64,
}
