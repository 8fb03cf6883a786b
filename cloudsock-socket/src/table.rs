//! Adapts a plain `HashMap` into the view [`cloudsock_proto::framing::decide`]
//! needs. The map itself, plus its mutex, is owned by [`crate::CloudSocket`];
//! this type only borrows it for the duration of one `decide` call.

use std::collections::HashMap;

use cloudsock_proto::ClientTable as FramingClientTable;

use crate::client::ClientEntry;

pub struct TableView<'a>(pub &'a mut HashMap<String, ClientEntry>);

impl<'a> FramingClientTable for TableView<'a> {
    type Client = ClientEntry;

    fn get_mut(&mut self, client_id: &str) -> Option<&mut ClientEntry> {
        self.0.get_mut(client_id)
    }

    fn contains(&self, client_id: &str) -> bool {
        self.0.contains_key(client_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsock_crypto::codec;
    use cloudsock_proto::{framing, fragments::FragmentTable, salt::SaltWatermark, Decision};

    #[test]
    fn plain_connect_creates_an_entry_a_real_client_table_can_then_see() {
        let mut clients: HashMap<String, ClientEntry> = HashMap::new();
        let mut fragments = FragmentTable::new();
        let mut watermark = SaltWatermark::new();

        let body = codec::encode("_connect");
        let raw = format!("1{body}.1234500101");
        let decision = {
            let mut view = TableView(&mut clients);
            framing::decide(&raw, &mut fragments, &mut view, None, &mut watermark, 0)
        };
        match decision {
            Decision::NewClient { client_id } => {
                clients.insert(client_id.clone(), ClientEntry::insecure(client_id.clone(), None, false));
                assert!(TableView(&mut clients).contains("12345"));
            }
            other => panic!("expected NewClient, got {other:?}"),
        }
    }

    #[test]
    fn an_existing_insecure_client_buffers_and_then_delivers() {
        let mut clients: HashMap<String, ClientEntry> = HashMap::new();
        clients.insert("12345".to_string(), ClientEntry::insecure("12345".to_string(), None, false));
        let mut fragments = FragmentTable::new();
        let mut watermark = SaltWatermark::new();

        let digits = codec::encode("hello");
        let raw = format!("1{digits}.1234500101");
        let mut view = TableView(&mut clients);
        match framing::decide(&raw, &mut fragments, &mut view, None, &mut watermark, 0) {
            Decision::MessageReady { client_id, message } => {
                assert_eq!(client_id, "12345");
                assert_eq!(message, "hello");
            }
            other => panic!("expected MessageReady, got {other:?}"),
        }
    }
}
