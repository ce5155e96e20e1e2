/// What the bytes under a stack frame are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ContentClass {
    /// Character data of an element that is not allow-listed. Never emitted.
    #[default]
    UnsafeText,
    /// Character data of an allow-listed element. Emitted.
    SafeText,
    /// Inside a start tag, between the name and `>`.
    Tag,
    /// Body of a `<script>` element.
    Script,
    /// Inside `<!-- ... -->`.
    Comment,
}

/// One frame of the scanner's stack. `tag` borrows the element name straight
/// from the input, in its original case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Context<'a> {
    pub content: ContentClass,
    pub tag: &'a str,
}

impl<'a> Context<'a> {
    pub fn new(content: ContentClass, tag: &'a str) -> Self {
        Self { content, tag }
    }

    /// Case-insensitive tag comparison.
    pub fn is_tag(&self, name: &str) -> bool {
        !self.tag.is_empty() && self.tag.eq_ignore_ascii_case(name)
    }
}

/// LIFO of scanner contexts over a growable array.
///
/// The bottom frame is the document itself (safe text, no tag). It is
/// installed by [`ContextStack::new`] and can never be popped, so
/// [`ContextStack::peek`] always has something to return.
#[derive(Debug, Clone)]
pub(crate) struct ContextStack<'a> {
    frames: Vec<Context<'a>>,
}

impl<'a> ContextStack<'a> {
    pub fn new() -> Self {
        Self {
            frames: vec![Context::new(ContentClass::SafeText, "")],
        }
    }

    pub fn push(&mut self, context: Context<'a>) {
        self.frames.push(context);
    }

    /// Removes the top frame. The document frame stays put.
    pub fn pop(&mut self) -> Option<Context<'a>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn peek(&self) -> Context<'a> {
        self.frames[self.frames.len() - 1]
    }

    /// Number of frames from the top down to and including the first one
    /// that satisfies `matches`, or `None` when no frame does.
    pub fn depth_of(&self, mut matches: impl FnMut(&Context<'a>) -> bool) -> Option<usize> {
        self.frames
            .iter()
            .rev()
            .position(|frame| matches(frame))
            .map(|index| index + 1)
    }

    /// Pops up to `count` frames, never the document frame.
    pub fn pop_many(&mut self, count: usize) {
        let keep = self.frames.len().saturating_sub(count).max(1);
        self.frames.truncate(keep);
    }

    /// Closes element `name`: pops everything above its innermost open frame
    /// and the frame itself. Returns `false` (and pops nothing) when the
    /// element is not open.
    pub fn close(&mut self, name: &str) -> bool {
        match self.depth_of(|frame| frame.is_tag(name)) {
            Some(depth) => {
                self.pop_many(depth);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}
