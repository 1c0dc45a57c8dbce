//! Translation of prepared cursors into MongoDB find options.
//!
//! Filters and projections are already in MongoDB's native grammar, so only the cursor
//! options need mapping onto [`FindOptions`].

use bson::{Document, doc};
use mongodb::options::{FindOptions, Hint, ReadPreference, SelectionCriteria};

use docquery_core::{
    cursor::{CursorFlag, CursorOptions},
    entity::ID_KEY,
};

/// Maps cursor options onto driver find options.
pub(crate) struct MongoCursorTranslator;

impl MongoCursorTranslator {
    /// Builds the find options for a cursor.
    ///
    /// Servers dropped the snapshot option, so snapshot mode is expressed as a hint on
    /// the `_id` index, unless the cursor already names an index.
    pub fn find_options(options: &CursorOptions, projection: Option<Document>) -> FindOptions {
        let mut find = FindOptions::default();

        find.projection = projection;
        find.skip = options.skip;
        find.limit = options.limit;
        find.batch_size = options.batch_size;
        find.sort = options.sort.clone();

        find.hint = match (&options.hint, options.snapshot) {
            (Some(index), _) => Some(Hint::Name(index.clone())),
            (None, true) => Some(Hint::Keys(doc! { ID_KEY: 1 })),
            (None, false) => None,
        };

        if options.has_flag(CursorFlag::SecondaryOk) {
            find.selection_criteria = Some(SelectionCriteria::ReadPreference(
                ReadPreference::SecondaryPreferred {
                    options: Default::default(),
                },
            ));
        }

        if options.has_flag(CursorFlag::NoCursorTimeout) {
            find.no_cursor_timeout = Some(true);
        }

        find
    }
}
