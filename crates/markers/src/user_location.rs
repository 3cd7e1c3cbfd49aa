use foundation::bounds::LngLat;

use crate::renderable::{MarkerContent, MarkerHandle, MarkerProps};
use crate::session::{MapError, MapSession, MapSurface, MarkerView, PoolToken};

/// The "you are here" marker, alone in its own pool.
#[derive(Debug)]
pub struct UserLocationMarker {
    token: PoolToken,
    marker: Option<(MarkerHandle, LngLat)>,
}

impl UserLocationMarker {
    pub fn new(token: PoolToken) -> Self {
        Self { token, marker: None }
    }

    pub fn position(&self) -> Option<LngLat> {
        self.marker.as_ref().map(|(_, pos)| *pos)
    }

    /// Moves the marker to `pos`. Returns `false` when it is already there.
    pub fn update<M: MapSurface, V: MarkerView>(
        &mut self,
        session: &mut MapSession<M, V>,
        pos: LngLat,
    ) -> Result<bool, MapError> {
        if self.position() == Some(pos) {
            return Ok(false);
        }
        if !session.is_ready() {
            return Err(MapError::NotReady);
        }

        self.clear(session);
        let handle = session.pool(&self.token).create(MarkerProps {
            position: pos,
            content: MarkerContent::UserLocation,
        })?;
        self.marker = Some((handle, pos));
        Ok(true)
    }

    pub fn clear<M: MapSurface, V: MarkerView>(&mut self, session: &mut MapSession<M, V>) {
        if let Some((handle, _)) = self.marker.take()
            && let Err(err) = session.pool(&self.token).destroy(handle)
        {
            tracing::warn!(error = %err, "failed to remove user location marker");
        }
    }
}
