/*!
# Ontwatch DevKit - Stubs et Utilitaires pour Tests

Bibliothèque facilitant les tests du moniteur sans GenieACS ni passerelle :
- Source de données scriptée (un lot par cycle)
- Notifier qui enregistre les livraisons et peut échouer par destinataire
- Builder d'enregistrements bruts au format GenieACS
- Harness : moniteur complet sur un fichier d'état temporaire
*/

pub mod record_builder;
pub mod stubs;
pub mod test_utils;

pub use record_builder::RawRecordBuilder;
pub use stubs::{Delivery, RecordingNotifier, StubDataSource};
pub use test_utils::TestHarness;
