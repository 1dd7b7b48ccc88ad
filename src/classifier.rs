use crate::calibration::ValueSnapshot;
use crate::channels::{Channel, ChannelSpec, CHANNELS, CHANNEL_COUNT};
use heapless::LinearMap;

/// In-band flag per banded channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationMap {
    states: LinearMap<Channel, bool, CHANNEL_COUNT>,
}

impl ClassificationMap {
    /// The "nothing classified yet" state used before the first cycle.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: Channel) -> Option<bool> {
        self.states.get(&channel).copied()
    }

    pub fn insert(&mut self, channel: Channel, in_band: bool) {
        if self.states.insert(channel, in_band).is_err() {
            tracing::warn!(%channel, "classification map full, state dropped");
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, bool)> + '_ {
        self.states.iter().map(|(c, b)| (*c, *b))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

pub fn classify(snapshot: &ValueSnapshot) -> ClassificationMap {
    classify_table(&CHANNELS, snapshot)
}

/// Classify against the bands of an explicit table. Channels the table does
/// not list, or lists without a band, are left out.
pub fn classify_table(table: &[ChannelSpec], snapshot: &ValueSnapshot) -> ClassificationMap {
    let mut map = ClassificationMap::new();
    for (channel, value) in snapshot.iter() {
        let band = table
            .iter()
            .find(|spec| spec.channel == channel)
            .and_then(|spec| spec.band);
        if let Some(band) = band {
            map.insert(channel, band.contains(value));
        }
    }
    map
}
