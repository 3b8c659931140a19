//! Аллокатор свободных байтовых интервалов на AVL-дереве.
//!
//! Хранит множество непересекающихся и несмежных свободных диапазонов
//! [start, end) арены очереди записей. Смежные диапазоны сливаются жадно
//! при вставке — это обязательное свойство, а не оптимизация: без слияния
//! `search` возвращал бы "нет места" при наличии непрерывного свободного
//! пространства.
//!
//! Узлы лежат в арене и адресуются индексами ([`NodeId`]) вместо сырых
//! ссылок parent/left/right.

use rfsweep_types::{SweepError, SweepResult};

/// Индекс узла в арене дерева. Действителен до `delete`/`clear`.
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    start: u64,
    end: u64,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    // Кэшируемые агрегаты поддерева
    max_length: u64,
    min_start: u64,
    max_end: u64,
    height: u32,
}

impl Node {
    fn new(
        start: u64,
        end: u64,
    ) -> Self {
        Self {
            start,
            end,
            parent: None,
            left: None,
            right: None,
            max_length: end - start,
            min_start: start,
            max_end: end,
            height: 1,
        }
    }

    fn length(&self) -> u64 {
        self.end - self.start
    }
}

/// AVL-дерево свободных интервалов.
#[derive(Debug, Default)]
pub struct IntervalAllocator {
    nodes: Vec<Node>,
    free_slots: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl IntervalAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Количество свободных интервалов в дереве.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Границы узла [start, end).
    pub fn range(
        &self,
        id: NodeId,
    ) -> (u64, u64) {
        (self.nodes[id].start, self.nodes[id].end)
    }

    /// Длина интервала узла.
    pub fn length(
        &self,
        id: NodeId,
    ) -> u64 {
        self.nodes[id].length()
    }

    /// Суммарное свободное пространство.
    pub fn total_free(&self) -> u64 {
        self.free_ranges().iter().map(|(s, e)| e - s).sum()
    }

    /// Свободные интервалы в порядке возрастания start (in-order обход).
    pub fn free_ranges(&self) -> Vec<(u64, u64)> {
        let mut out = Vec::with_capacity(self.len);
        self.in_order(self.root, &mut out);
        out
    }

    /// Удаляет все интервалы.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_slots.clear();
        self.root = None;
        self.len = 0;
    }

    /// Вставляет свободный диапазон [start, end).
    ///
    /// Смежный с существующим узлом диапазон сливается в него (каскадно,
    /// если слияние создало новые смежности).
    ///
    /// # Panics
    ///
    /// Пересечение с уже учтённым диапазоном — нарушение внутреннего
    /// инварианта (двойное освобождение), а не ошибка пользователя.
    pub fn insert(
        &mut self,
        start: u64,
        end: u64,
    ) {
        assert!(start < end, "empty interval [{start}, {end})");

        let id = self.alloc_node(start, end);
        let changed = match self.root {
            None => {
                self.root = Some(id);
                id
            }
            Some(root) => self.insert_node(root, id),
        };

        let from = self.nodes[changed].parent.unwrap_or(changed);
        self.rebalance(from);
        self.refresh_aggregates();
    }

    /// Ищет узел длиной не менее `length` (первый подходящий при спуске с
    /// отсечением по `max_length`, не обязательно наименьший).
    pub fn search(
        &self,
        length: u64,
    ) -> Option<NodeId> {
        let root = self.root?;

        if self.nodes[root].max_length < length {
            return None;
        }

        let mut cur = root;
        loop {
            if self.nodes[cur].length() >= length {
                return Some(cur);
            }

            if let Some(l) = self.nodes[cur].left {
                if self.nodes[l].max_length >= length {
                    cur = l;
                    continue;
                }
            }

            if let Some(r) = self.nodes[cur].right {
                if self.nodes[r].max_length >= length {
                    cur = r;
                    continue;
                }
            }

            return None;
        }
    }

    /// Удаляет узел, повторно вставляя его осиротевшие поддеревья.
    pub fn delete(
        &mut self,
        id: NodeId,
    ) {
        let parent = self.nodes[id].parent;
        let left = self.nodes[id].left;
        let right = self.nodes[id].right;

        match parent {
            Some(p) => {
                if self.nodes[p].left == Some(id) {
                    self.nodes[p].left = None;
                } else if self.nodes[p].right == Some(id) {
                    self.nodes[p].right = None;
                }
            }
            None => self.root = None,
        }

        // Поддерево — непрерывный диапазон ключей, поэтому его можно
        // подвесить целиком в позицию, найденную по ключу корня поддерева.
        for child in [left, right].into_iter().flatten() {
            self.nodes[child].parent = None;
            match self.root {
                None => self.root = Some(child),
                Some(root) => {
                    self.insert_node(root, child);
                }
            }
        }

        self.release_node(id);

        if self.root.is_some() {
            let from = parent.unwrap_or_else(|| self.root.unwrap());
            self.rebalance(from);
            self.refresh_aggregates();
        }
    }

    /// Сужает границы узла (частичное потребление свободного диапазона).
    ///
    /// Требует `new_start >= start` и `new_end <= end`, иначе `Range`.
    pub fn shrink(
        &mut self,
        id: NodeId,
        new_start: u64,
        new_end: u64,
    ) -> SweepResult<()> {
        let node = &self.nodes[id];

        if new_start < node.start {
            return Err(SweepError::Range(format!(
                "new_start value must be greater than {}",
                node.start
            )));
        }

        if new_end > node.end {
            return Err(SweepError::Range(format!(
                "new_end value must be less than {}",
                node.end
            )));
        }

        self.nodes[id].start = new_start;
        self.nodes[id].end = new_end;
        self.refresh_aggregates();

        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутреннее: арена узлов
    ////////////////////////////////////////////////////////////////////////////

    fn alloc_node(
        &mut self,
        start: u64,
        end: u64,
    ) -> NodeId {
        self.len += 1;

        match self.free_slots.pop() {
            Some(id) => {
                self.nodes[id] = Node::new(start, end);
                id
            }
            None => {
                self.nodes.push(Node::new(start, end));
                self.nodes.len() - 1
            }
        }
    }

    fn release_node(
        &mut self,
        id: NodeId,
    ) {
        self.len -= 1;
        self.free_slots.push(id);
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутреннее: вставка и слияние
    ////////////////////////////////////////////////////////////////////////////

    /// Спускается от `from`, подвешивая `child` листом либо сливая его со
    /// смежным узлом. Возвращает узел, в котором произошло изменение.
    fn insert_node(
        &mut self,
        from: NodeId,
        child: NodeId,
    ) -> NodeId {
        let mut cur = from;

        loop {
            let (cs, ce) = (self.nodes[child].start, self.nodes[child].end);
            let (ps, pe) = (self.nodes[cur].start, self.nodes[cur].end);

            if ce < ps {
                match self.nodes[cur].left {
                    Some(l) => cur = l,
                    None => {
                        self.nodes[cur].left = Some(child);
                        self.nodes[child].parent = Some(cur);
                        return child;
                    }
                }
            } else if cs > pe {
                match self.nodes[cur].right {
                    Some(r) => cur = r,
                    None => {
                        self.nodes[cur].right = Some(child);
                        self.nodes[child].parent = Some(cur);
                        return child;
                    }
                }
            } else if ce == ps || pe == cs {
                self.merge(cur, child);
                return cur;
            } else {
                panic!(
                    "interval allocator invariant violated: \
                     [{cs}, {ce}) intersects with [{ps}, {pe})"
                );
            }
        }
    }

    /// Поглощает `source` узлом `target`, затем каскадно сливает новые
    /// смежности в поддеревьях target.
    fn merge(
        &mut self,
        target: NodeId,
        source: NodeId,
    ) {
        let (s_start, s_end) = (self.nodes[source].start, self.nodes[source].end);
        let s_parent = self.nodes[source].parent;
        let s_left = self.nodes[source].left;
        let s_right = self.nodes[source].right;

        self.nodes[target].start = self.nodes[target].start.min(s_start);
        self.nodes[target].end = self.nodes[target].end.max(s_end);

        if let Some(p) = s_parent {
            if self.nodes[p].left == Some(source) {
                self.nodes[p].left = None;
            } else if self.nodes[p].right == Some(source) {
                self.nodes[p].right = None;
            }
            self.nodes[source].parent = None;
        }

        self.nodes[source].left = None;
        self.nodes[source].right = None;
        self.release_node(source);

        for child in [s_left, s_right].into_iter().flatten() {
            self.nodes[child].parent = None;
            self.insert_node(target, child);
        }

        // Слияние могло сделать target смежным с крайними узлами его
        // собственных поддеревьев.
        let t_end = self.nodes[target].end;
        if let Some(r) = self.nodes[target].right {
            let mut n = r;
            loop {
                if self.nodes[n].start == t_end {
                    self.merge(target, n);
                    break;
                }
                match self.nodes[n].left {
                    Some(l) => n = l,
                    None => break,
                }
            }
        }

        let t_start = self.nodes[target].start;
        if let Some(l) = self.nodes[target].left {
            let mut n = l;
            loop {
                if self.nodes[n].end == t_start {
                    self.merge(target, n);
                    break;
                }
                match self.nodes[n].right {
                    Some(r) => n = r,
                    None => break,
                }
            }
        }
    }

    ////////////////////////////////////////////////////////////////////////////
    // Внутреннее: балансировка и агрегаты
    ////////////////////////////////////////////////////////////////////////////

    fn height_of(
        &self,
        id: Option<NodeId>,
    ) -> u32 {
        id.map_or(0, |n| self.nodes[n].height)
    }

    fn balance_factor(
        &self,
        id: NodeId,
    ) -> i32 {
        self.height_of(self.nodes[id].left) as i32 - self.height_of(self.nodes[id].right) as i32
    }

    fn update_height_local(
        &mut self,
        id: NodeId,
    ) {
        let h = 1 + self
            .height_of(self.nodes[id].left)
            .max(self.height_of(self.nodes[id].right));
        self.nodes[id].height = h;
    }

    /// Поворот вокруг узла с перевеса вправо. Возвращает новый корень
    /// поддерева.
    fn rotate_left(
        &mut self,
        node: NodeId,
    ) -> NodeId {
        let Some(pivot) = self.nodes[node].right else {
            return node;
        };

        let pivot_left = self.nodes[pivot].left;
        let parent = self.nodes[node].parent;

        self.nodes[node].right = pivot_left;
        if let Some(pl) = pivot_left {
            self.nodes[pl].parent = Some(node);
        }

        self.nodes[pivot].parent = parent;
        match parent {
            None => self.root = Some(pivot),
            Some(p) => {
                if self.nodes[p].left == Some(node) {
                    self.nodes[p].left = Some(pivot);
                } else {
                    self.nodes[p].right = Some(pivot);
                }
            }
        }

        self.nodes[pivot].left = Some(node);
        self.nodes[node].parent = Some(pivot);

        self.update_height_local(node);
        self.update_height_local(pivot);

        pivot
    }

    fn rotate_right(
        &mut self,
        node: NodeId,
    ) -> NodeId {
        let Some(pivot) = self.nodes[node].left else {
            return node;
        };

        let pivot_right = self.nodes[pivot].right;
        let parent = self.nodes[node].parent;

        self.nodes[node].left = pivot_right;
        if let Some(pr) = pivot_right {
            self.nodes[pr].parent = Some(node);
        }

        self.nodes[pivot].parent = parent;
        match parent {
            None => self.root = Some(pivot),
            Some(p) => {
                if self.nodes[p].right == Some(node) {
                    self.nodes[p].right = Some(pivot);
                } else {
                    self.nodes[p].left = Some(pivot);
                }
            }
        }

        self.nodes[pivot].right = Some(node);
        self.nodes[node].parent = Some(pivot);

        self.update_height_local(node);
        self.update_height_local(pivot);

        pivot
    }

    /// Поднимается от `node` к корню, выполняя повороты там, где баланс-фактор
    /// вышел за ±1.
    fn rebalance(
        &mut self,
        node: NodeId,
    ) {
        self.recompute_heights(self.root);

        let mut cur = node;
        loop {
            self.update_height_local(cur);

            let bf = self.balance_factor(cur);
            if bf > 1 {
                if let Some(l) = self.nodes[cur].left {
                    if self.balance_factor(l) < 0 {
                        self.rotate_left(l);
                    }
                }
                cur = self.rotate_right(cur);
            } else if bf < -1 {
                if let Some(r) = self.nodes[cur].right {
                    if self.balance_factor(r) > 0 {
                        self.rotate_right(r);
                    }
                }
                cur = self.rotate_left(cur);
            }

            match self.nodes[cur].parent {
                Some(p) => cur = p,
                None => {
                    self.root = Some(cur);
                    return;
                }
            }
        }
    }

    fn recompute_heights(
        &mut self,
        id: Option<NodeId>,
    ) -> u32 {
        let Some(id) = id else {
            return 0;
        };

        let lh = self.recompute_heights(self.nodes[id].left);
        let rh = self.recompute_heights(self.nodes[id].right);
        let h = 1 + lh.max(rh);
        self.nodes[id].height = h;
        h
    }

    /// Пересчитывает max_length / min_start / max_end по всему дереву
    /// снизу вверх после структурного изменения.
    fn refresh_aggregates(&mut self) {
        self.refresh_rec(self.root);
    }

    fn refresh_rec(
        &mut self,
        id: Option<NodeId>,
    ) -> Option<(u64, u64, u64)> {
        let id = id?;

        let left = self.refresh_rec(self.nodes[id].left);
        let right = self.refresh_rec(self.nodes[id].right);

        let mut max_length = self.nodes[id].length();
        let mut min_start = self.nodes[id].start;
        let mut max_end = self.nodes[id].end;

        if let Some((l_len, l_min, l_max)) = left {
            max_length = max_length.max(l_len);
            min_start = min_start.min(l_min);
            max_end = max_end.max(l_max);
        }
        if let Some((r_len, r_min, r_max)) = right {
            max_length = max_length.max(r_len);
            min_start = min_start.min(r_min);
            max_end = max_end.max(r_max);
        }

        self.nodes[id].max_length = max_length;
        self.nodes[id].min_start = min_start;
        self.nodes[id].max_end = max_end;

        Some((max_length, min_start, max_end))
    }

    fn in_order(
        &self,
        id: Option<NodeId>,
        out: &mut Vec<(u64, u64)>,
    ) {
        let Some(id) = id else {
            return;
        };

        self.in_order(self.nodes[id].left, out);
        out.push((self.nodes[id].start, self.nodes[id].end));
        self.in_order(self.nodes[id].right, out);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
